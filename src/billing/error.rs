//! Errors raised while applying payment effects.

use crate::billing::model::InvoiceType;
use crate::database::error::DatabaseError;
use thiserror::Error;

/// Failure inside the atomic settlement unit. Any of these aborts the whole
/// unit: persisted state rolls back and the delivery is left unmarked so the
/// gateway redelivers it.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("post-payment callback for {invoice_type} invoice failed: {message}")]
    Callback {
        invoice_type: InvoiceType,
        message: String,
    },

    #[error("payout ledger rejected transfer {reference}: {message}")]
    Payout { reference: String, message: String },
}

impl EffectError {
    pub fn callback<S: Into<String>>(invoice_type: InvoiceType, message: S) -> Self {
        EffectError::Callback {
            invoice_type,
            message: message.into(),
        }
    }
}
