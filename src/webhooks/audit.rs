use crate::database::error::DatabaseError;
use crate::webhooks::event::WebhookDelivery;
use async_trait::async_trait;
use uuid::Uuid;

/// Audit trail for webhook deliveries.
///
/// Auditing is best effort: the receiver logs and continues when either call
/// fails, so an audit outage never blocks settlement.
#[async_trait]
pub trait WebhookAuditLog: Send + Sync {
    /// Records an accepted delivery before processing. Returns the audit row
    /// id used to close the record later.
    async fn delivery_received(&self, delivery: &WebhookDelivery) -> Result<Uuid, DatabaseError>;

    /// Closes the audit row with the pipeline's outcome
    async fn delivery_resolved(
        &self,
        audit_id: Uuid,
        outcome: &str,
        error: Option<&str>,
    ) -> Result<(), DatabaseError>;
}
