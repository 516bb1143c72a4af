//! Invoice and transaction lifecycle: the settlement state machine, the
//! atomic effect dispatcher, payment initiation and background aging.

pub mod callbacks;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod service;
pub mod state_machine;
pub mod sweeper;

pub use callbacks::{CallbackRegistry, InvoicePaidCallback, PayoutLedger};
pub use dispatcher::{DispatchOutcome, EffectDispatcher, PgEffectDispatcher};
pub use error::EffectError;
pub use model::{Invoice, InvoiceStatus, InvoiceType, Transaction, TransactionStatus};
pub use service::{InvoicePayments, ReconcileOutcome};
pub use sweeper::BillingSweeper;
