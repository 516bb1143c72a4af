//! Inbound gateway webhooks: signature verification, typed event parsing,
//! duplicate suppression and the processing pipeline.

pub mod audit;
pub mod error;
pub mod event;
pub mod idempotency;
pub mod receiver;
pub mod security;

pub use audit::WebhookAuditLog;
pub use error::{ReceiverError, SecurityError};
pub use event::{GatewayEvent, WebhookDelivery, SIGNATURE_HEADER};
pub use idempotency::{IdempotencyStore, MemoryIdempotencyStore, RedisIdempotencyStore};
pub use receiver::{WebhookOutcome, WebhookReceiver};
pub use security::WebhookVerifier;
