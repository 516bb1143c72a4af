//! Webhook rejection and processing errors.

use crate::billing::error::EffectError;
use thiserror::Error;

/// Why a delivery was turned away at the trust boundary.
///
/// Signature problems map to HTTP 401; everything else here maps to 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("signature header is missing")]
    MissingSignature,

    #[error("signature does not match the request body")]
    InvalidSignature,

    #[error("payload is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("payload is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("payload field '{field}' has the wrong type")]
    InvalidField { field: &'static str },
}

impl SecurityError {
    /// Signature failures are authentication failures, not bad requests
    pub fn is_signature_failure(&self) -> bool {
        matches!(
            self,
            SecurityError::MissingSignature | SecurityError::InvalidSignature
        )
    }
}

/// Error surface of the webhook receiver pipeline
#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The signing secret is not configured; the caller answers 500 so the
    /// gateway keeps redelivering until operations fix the deployment.
    #[error("webhook signing secret is not configured")]
    MissingSecret,

    #[error(transparent)]
    Effect(#[from] EffectError),
}
