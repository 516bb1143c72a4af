//! Post-payment hooks.
//!
//! When an invoice settles, the domain area that issued it gets to react:
//! admissions flips an application to paid, the fees office unlocks a term,
//! and so on. Hooks run inside the settlement transaction, so a failing hook
//! rolls the whole settlement back and the delivery is retried.

use crate::billing::error::EffectError;
use crate::billing::model::InvoiceType;
use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Reaction to a settled invoice, keyed by invoice type.
///
/// Implementations must be idempotent: settlement can be retried after a
/// crash between commit and the idempotency mark, so marking an owner that is
/// already marked has to succeed.
#[async_trait]
pub trait InvoicePaidCallback: Send + Sync {
    /// Runs on the settlement transaction's connection. `owner_id` is the
    /// student or applicant the settled invoice billed.
    async fn mark_paid(&self, conn: &mut PgConnection, owner_id: Uuid) -> Result<(), EffectError>;
}

/// Maps invoice types to their settlement hooks. Types without a registered
/// hook settle normally; the dispatcher just logs that nothing ran.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    callbacks: HashMap<InvoiceType, Arc<dyn InvoicePaidCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        invoice_type: InvoiceType,
        callback: Arc<dyn InvoicePaidCallback>,
    ) -> &mut Self {
        self.callbacks.insert(invoice_type, callback);
        self
    }

    pub fn get(&self, invoice_type: InvoiceType) -> Option<&Arc<dyn InvoicePaidCallback>> {
        self.callbacks.get(&invoice_type)
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// Destination for outgoing transfer confirmations
#[async_trait]
pub trait PayoutLedger: Send + Sync {
    async fn record_transfer(&self, reference: &str, amount_minor: i64)
        -> Result<(), EffectError>;
}

/// Default ledger: structured log entry only. Deployments that reconcile
/// payouts elsewhere leave this in place.
pub struct LoggingPayoutLedger;

#[async_trait]
impl PayoutLedger for LoggingPayoutLedger {
    async fn record_transfer(
        &self,
        reference: &str,
        amount_minor: i64,
    ) -> Result<(), EffectError> {
        info!(reference, amount_minor, "Transfer confirmation recorded");
        metrics::counter!("payouts_recorded_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopCallback;

    #[async_trait]
    impl InvoicePaidCallback for NoopCallback {
        async fn mark_paid(
            &self,
            _conn: &mut PgConnection,
            _owner_id: Uuid,
        ) -> Result<(), EffectError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_resolves_by_invoice_type() {
        let mut registry = CallbackRegistry::new();
        assert!(registry.is_empty());

        registry.register(InvoiceType::ApplicationFee, Arc::new(NoopCallback));

        assert!(registry.get(InvoiceType::ApplicationFee).is_some());
        assert!(registry.get(InvoiceType::SchoolFees).is_none());
    }

    #[tokio::test]
    async fn test_logging_ledger_accepts_transfers() {
        let ledger = LoggingPayoutLedger;
        assert!(ledger.record_transfer("payout_1", 5_000).await.is_ok());
    }
}
