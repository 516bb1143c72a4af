//! Webhook signature verification.
//!
//! Verification runs over the exact raw request bytes, before any JSON
//! parsing. Re-serialized or trimmed bodies produce different digests, so the
//! handler must hand the body through untouched.

use crate::webhooks::error::{ReceiverError, SecurityError};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use tracing::{error, warn};

type HmacSha512 = Hmac<Sha512>;

/// Verifies the gateway's HMAC-SHA512 hex signature over raw request bodies
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Checks the signature header against the raw body.
    ///
    /// Rejects empty bodies and missing headers before doing any crypto. A
    /// missing secret is a deployment fault, reported as
    /// [`ReceiverError::MissingSecret`] rather than a security rejection.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), ReceiverError> {
        if body.is_empty() {
            return Err(SecurityError::EmptyBody.into());
        }

        let secret = match &self.secret {
            Some(secret) => secret,
            None => {
                error!("Webhook signing secret is not configured; rejecting delivery");
                return Err(ReceiverError::MissingSecret);
            }
        };

        let provided = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SecurityError::MissingSignature)?;

        let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks
        let matches = expected.len() == provided.len()
            && expected
                .bytes()
                .zip(provided.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0;

        if !matches {
            warn!("Webhook signature mismatch");
            metrics::counter!("webhook_signature_failures_total").increment(1);
            return Err(SecurityError::InvalidSignature.into());
        }

        Ok(())
    }
}

/// Computes the hex signature the gateway would send for `body`. Used by
/// tests and by local delivery tooling.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
