//! Payment gateway integration module
//!
//! This module provides a gateway-agnostic interface for collecting invoice
//! payments, with Paystack as the production implementation.

pub mod providers;
pub mod traits;
pub mod types;

pub use providers::PaystackGateway;
pub use traits::PaymentGateway;
pub use types::{
    generate_reference, InitializePaymentRequest, PaymentInit, VerifiedStatus, VerifiedTransaction,
};
