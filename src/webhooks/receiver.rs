//! Webhook processing pipeline.
//!
//! Order is fixed: signature verification over the raw bytes, then parsing,
//! then the idempotency guard, then the effect dispatcher, and only after a
//! successful commit the processed mark. A dispatch error leaves the delivery
//! unmarked so the gateway's redelivery gets a clean retry.

use crate::billing::dispatcher::{DispatchOutcome, EffectDispatcher};
use crate::webhooks::audit::WebhookAuditLog;
use crate::webhooks::error::ReceiverError;
use crate::webhooks::event::{parse_delivery, GatewayEvent};
use crate::webhooks::idempotency::{delivery_key, IdempotencyStore};
use crate::webhooks::security::WebhookVerifier;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Terminal result of one delivery. All variants are acknowledged with
/// HTTP 200; the gateway must not redeliver any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State changed: a settlement, failure, reversal or payout was recorded
    Processed,
    /// Delivery or its transaction was already handled
    Duplicate,
    /// Unhandled event name, or no matching transaction
    Ignored,
    /// Event contradicted our records; an alert was raised instead
    Rejected,
}

pub struct WebhookReceiver {
    verifier: WebhookVerifier,
    guard: Arc<dyn IdempotencyStore>,
    dispatcher: Arc<dyn EffectDispatcher>,
    audit: Option<Arc<dyn WebhookAuditLog>>,
    idempotency_ttl: Duration,
}

impl WebhookReceiver {
    pub fn new(
        verifier: WebhookVerifier,
        guard: Arc<dyn IdempotencyStore>,
        dispatcher: Arc<dyn EffectDispatcher>,
        idempotency_ttl: Duration,
    ) -> Self {
        Self {
            verifier,
            guard,
            dispatcher,
            audit: None,
            idempotency_ttl,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn WebhookAuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Runs one delivery through the pipeline.
    ///
    /// `body` must be the raw request bytes exactly as received; the
    /// signature covers them byte for byte.
    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ReceiverError> {
        metrics::counter!("webhooks_received_total").increment(1);

        self.verifier.verify(body, signature)?;
        let delivery = parse_delivery(body)?;

        let key = delivery_key(
            delivery.event.name(),
            &delivery.delivery_id,
            delivery.event.reference().unwrap_or_default(),
        );
        // Every delivery that verified and parsed is audited, handled or not
        let audit_id = self.audit_received(&delivery).await;

        match self.guard.is_processed(&key).await {
            Ok(true) => {
                debug!(
                    delivery_id = %delivery.delivery_id,
                    event = delivery.event.name(),
                    "Duplicate delivery suppressed"
                );
                metrics::counter!("webhooks_duplicates_total").increment(1);
                self.audit_resolved(audit_id, "duplicate", None).await;
                return Ok(WebhookOutcome::Duplicate);
            }
            Ok(false) => {}
            Err(e) => {
                // Guard is an optimization; the dispatcher's terminal-status
                // check keeps a replay harmless.
                warn!("Idempotency check unavailable, continuing: {}", e);
            }
        }

        // An unhandled event is a benign no-op: fully processed, so it is
        // marked and audited like any other resolution.
        if let GatewayEvent::Unhandled { event } = &delivery.event {
            debug!(event, "Acknowledging unhandled webhook event");
            metrics::counter!("webhooks_ignored_total", "reason" => "unhandled_event")
                .increment(1);
            self.mark_delivery(&delivery.delivery_id, &key).await;
            self.audit_resolved(audit_id, "ignored", None).await;
            return Ok(WebhookOutcome::Ignored);
        }

        let outcome = match self.dispatcher.dispatch(&delivery.event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    delivery_id = %delivery.delivery_id,
                    event = delivery.event.name(),
                    "Webhook effects failed; delivery left unmarked for redelivery: {}",
                    e
                );
                metrics::counter!("webhook_effect_failures_total").increment(1);
                self.audit_resolved(audit_id, "failed", Some(&e.to_string()))
                    .await;
                return Err(e.into());
            }
        };

        // Only committed work gets a mark
        self.mark_delivery(&delivery.delivery_id, &key).await;

        self.audit_resolved(audit_id, outcome.as_str(), None).await;
        info!(
            delivery_id = %delivery.delivery_id,
            event = delivery.event.name(),
            outcome = outcome.as_str(),
            "Webhook delivery resolved"
        );
        metrics::counter!("webhooks_resolved_total", "outcome" => outcome.as_str()).increment(1);

        Ok(match outcome {
            DispatchOutcome::Applied | DispatchOutcome::PayoutRouted => WebhookOutcome::Processed,
            DispatchOutcome::AlreadyApplied => WebhookOutcome::Duplicate,
            DispatchOutcome::Orphaned | DispatchOutcome::Ignored => WebhookOutcome::Ignored,
            DispatchOutcome::Rejected => WebhookOutcome::Rejected,
        })
    }

    /// A mark failure is tolerated for the same reason a guard outage is:
    /// redelivery is harmless once the transaction is terminal.
    async fn mark_delivery(&self, delivery_id: &str, key: &str) {
        if let Err(e) = self.guard.mark_processed(key, self.idempotency_ttl).await {
            warn!(delivery_id, "Failed to mark delivery processed: {}", e);
        }
    }

    async fn audit_received(&self, delivery: &crate::webhooks::event::WebhookDelivery) -> Option<Uuid> {
        let audit = self.audit.as_ref()?;
        match audit.delivery_received(delivery).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Webhook audit insert failed, continuing: {}", e);
                None
            }
        }
    }

    async fn audit_resolved(&self, audit_id: Option<Uuid>, outcome: &str, error: Option<&str>) {
        let (Some(audit), Some(id)) = (self.audit.as_ref(), audit_id) else {
            return;
        };
        if let Err(e) = audit.delivery_resolved(id, outcome, error).await {
            warn!("Webhook audit update failed: {}", e);
        }
    }
}
