//! Cache key construction.
//!
//! All keys are namespaced under the service prefix so a shared Redis can be
//! swept per service.

const PREFIX: &str = "edusuite:payments";

/// Cached verification result for a gateway transaction reference
pub fn verification(reference: &str) -> String {
    format!("{PREFIX}:verify:{reference}")
}

/// Processed-delivery mark for a webhook idempotency digest
pub fn idempotency(digest: &str) -> String {
    format!("{PREFIX}:webhook:{digest}")
}
