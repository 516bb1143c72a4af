//! Atomic application of settlement decisions.
//!
//! The dispatcher is the only writer of billing state. For charge events it
//! opens one database transaction, locks the matched rows, asks the state
//! machine what to do, applies the row updates, runs the post-payment
//! callback on the same connection and commits. Any failure rolls the whole
//! unit back; callers then leave the delivery unmarked so the gateway
//! redelivers it.
//!
//! Concurrent deliveries for one reference serialize on the row lock: the
//! first settles, the second re-reads a terminal row and becomes a no-op.

use crate::billing::callbacks::{CallbackRegistry, LoggingPayoutLedger, PayoutLedger};
use crate::billing::error::EffectError;
use crate::billing::model::{Invoice, Transaction};
use crate::billing::state_machine::{decide, Alert, Decision, Effect, Resolution};
use crate::database::error::DatabaseError;
use crate::database::transaction::DatabaseTransaction;
use crate::database::{invoice_repository, transaction_repository};
use crate::webhooks::event::GatewayEvent;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// How a dispatched event was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Row changes committed (settlement, failure or reversal)
    Applied,
    /// Transaction already terminal; nothing changed
    AlreadyApplied,
    /// Event name outside the whitelist
    Ignored,
    /// No transaction row matches the reference
    Orphaned,
    /// Event contradicts our records; alert raised, nothing changed
    Rejected,
    /// Transfer confirmation recorded in the payout ledger
    PayoutRouted,
}

impl DispatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Applied => "applied",
            DispatchOutcome::AlreadyApplied => "already_applied",
            DispatchOutcome::Ignored => "ignored",
            DispatchOutcome::Orphaned => "orphaned",
            DispatchOutcome::Rejected => "rejected",
            DispatchOutcome::PayoutRouted => "payout_routed",
        }
    }
}

#[async_trait]
pub trait EffectDispatcher: Send + Sync {
    /// Applies one event atomically. `Err` means nothing was committed and
    /// the delivery is safe to retry.
    async fn dispatch(&self, event: &GatewayEvent) -> Result<DispatchOutcome, EffectError>;
}

/// Postgres-backed dispatcher used in production
pub struct PgEffectDispatcher {
    pool: PgPool,
    callbacks: CallbackRegistry,
    payouts: Arc<dyn PayoutLedger>,
}

impl PgEffectDispatcher {
    pub fn new(pool: PgPool, callbacks: CallbackRegistry) -> Self {
        Self {
            pool,
            callbacks,
            payouts: Arc::new(LoggingPayoutLedger),
        }
    }

    pub fn with_payout_ledger(mut self, payouts: Arc<dyn PayoutLedger>) -> Self {
        self.payouts = payouts;
        self
    }

    async fn apply_charge(
        &self,
        event: &GatewayEvent,
        reference: &str,
    ) -> Result<DispatchOutcome, EffectError> {
        let mut dbtx = DatabaseTransaction::begin(&self.pool).await?;

        // Lock order: transaction row first, then its invoice
        let Some(tx_row) = lock_transaction(dbtx.conn(), reference).await? else {
            dbtx.rollback().await?;
            warn!(reference, event = event.name(), "Orphaned webhook: no transaction matches");
            metrics::counter!("webhook_orphaned_total").increment(1);
            return Ok(DispatchOutcome::Orphaned);
        };
        let invoice = lock_invoice(dbtx.conn(), tx_row.invoice_id).await?;
        if invoice.is_none() {
            dbtx.rollback().await?;
            warn!(reference, "Transaction has no invoice row; treating as orphaned");
            return Ok(DispatchOutcome::Orphaned);
        }

        let decision = decide(event, Some(&tx_row), invoice.as_ref(), Utc::now());

        match decision.resolution {
            Resolution::AlreadyFinal => {
                dbtx.rollback().await?;
                debug!(reference, status = %tx_row.status, "Redelivery for terminal transaction");
                Ok(DispatchOutcome::AlreadyApplied)
            }
            Resolution::Rejected => {
                dbtx.rollback().await?;
                for effect in &decision.effects {
                    if let Effect::RaiseAlert(alert) = effect {
                        self.raise_alert(alert);
                    }
                }
                Ok(DispatchOutcome::Rejected)
            }
            Resolution::Orphaned => {
                dbtx.rollback().await?;
                Ok(DispatchOutcome::Orphaned)
            }
            Resolution::Ignored | Resolution::PayoutRouted => {
                // Charge events never resolve this way
                dbtx.rollback().await?;
                Ok(DispatchOutcome::Ignored)
            }
            Resolution::Settled | Resolution::FailureRecorded | Resolution::ReversalRecorded => {
                self.commit_decision(dbtx, &tx_row, invoice.as_ref(), event, &decision)
                    .await?;
                Ok(DispatchOutcome::Applied)
            }
        }
    }

    /// Applies the row updates and effects, then commits. Any error before
    /// the commit leaves the database untouched.
    async fn commit_decision(
        &self,
        mut dbtx: DatabaseTransaction,
        tx_row: &Transaction,
        invoice: Option<&Invoice>,
        event: &GatewayEvent,
        decision: &Decision,
    ) -> Result<(), EffectError> {
        if let Some(new_status) = decision.transaction_status {
            update_transaction(dbtx.conn(), tx_row.id, decision, event.payload()).await?;
            debug!(
                reference = %tx_row.reference,
                from = %tx_row.status,
                to = %new_status,
                "Transaction status transition"
            );
        }

        if let (Some(new_status), Some(inv)) = (decision.invoice_status, invoice) {
            update_invoice(dbtx.conn(), inv.id, decision, &tx_row.reference).await?;
            debug!(
                invoice_number = %inv.invoice_number,
                from = %inv.status,
                to = %new_status,
                "Invoice status transition"
            );
        }

        for effect in &decision.effects {
            match effect {
                Effect::InvokePaidCallback {
                    invoice_type,
                    owner_id,
                } => match self.callbacks.get(*invoice_type) {
                    Some(callback) => {
                        if let Err(e) = callback.mark_paid(dbtx.conn(), *owner_id).await {
                            error!(
                                reference = %tx_row.reference,
                                invoice_type = %invoice_type,
                                "Post-payment callback failed; rolling back settlement: {}",
                                e
                            );
                            metrics::counter!("settlement_callback_failures_total").increment(1);
                            dbtx.rollback().await?;
                            return Err(e);
                        }
                    }
                    None => {
                        info!(
                            invoice_type = %invoice_type,
                            "No post-payment callback registered for invoice type"
                        );
                    }
                },
                Effect::RecordFailureReason { reason } => {
                    debug!(
                        reference = %tx_row.reference,
                        reason = reason.as_deref().unwrap_or("none given"),
                        "Gateway failure reason recorded"
                    );
                }
                Effect::RecordPayout {
                    reference,
                    amount_minor,
                } => {
                    self.payouts.record_transfer(reference, *amount_minor).await?;
                }
                Effect::RaiseAlert(alert) => self.raise_alert(alert),
            }
        }

        dbtx.commit().await?;

        if decision.resolution == Resolution::Settled {
            info!(reference = %tx_row.reference, "Invoice settled");
            metrics::counter!("invoices_settled_total").increment(1);
        }
        Ok(())
    }

    fn raise_alert(&self, alert: &Alert) {
        match alert {
            Alert::AmountMismatch {
                reference,
                expected_minor,
                received_minor,
            } => {
                error!(
                    reference = %reference,
                    expected_minor,
                    received_minor,
                    "ALERT: charge amount does not match invoice total; settlement withheld"
                );
                metrics::counter!("settlement_alerts_total", "reason" => "amount_mismatch")
                    .increment(1);
            }
            Alert::InvoiceAlreadySettled {
                reference,
                invoice_id,
            } => {
                error!(
                    reference = %reference,
                    invoice_id = %invoice_id,
                    "ALERT: invoice already settled through another transaction"
                );
                metrics::counter!("settlement_alerts_total", "reason" => "already_settled")
                    .increment(1);
            }
        }
    }
}

#[async_trait]
impl EffectDispatcher for PgEffectDispatcher {
    #[instrument(skip_all, fields(event = event.name()))]
    async fn dispatch(&self, event: &GatewayEvent) -> Result<DispatchOutcome, EffectError> {
        match event {
            GatewayEvent::Unhandled { .. } => Ok(DispatchOutcome::Ignored),
            GatewayEvent::TransferSuccess(_) => {
                let decision = decide(event, None, None, Utc::now());
                for effect in &decision.effects {
                    if let Effect::RecordPayout {
                        reference,
                        amount_minor,
                    } = effect
                    {
                        self.payouts.record_transfer(reference, *amount_minor).await?;
                    }
                }
                Ok(DispatchOutcome::PayoutRouted)
            }
            GatewayEvent::ChargeSuccess(charge)
            | GatewayEvent::ChargeFailed(charge)
            | GatewayEvent::ChargeReversed(charge) => {
                self.apply_charge(event, &charge.reference).await
            }
        }
    }
}

async fn lock_transaction(
    conn: &mut PgConnection,
    reference: &str,
) -> Result<Option<Transaction>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE reference = $1 FOR UPDATE",
        transaction_repository::COLUMNS
    );
    sqlx::query_as::<_, Transaction>(&sql)
        .bind(reference)
        .fetch_optional(conn)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e))
}

async fn lock_invoice(
    conn: &mut PgConnection,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE id = $1 FOR UPDATE",
        invoice_repository::COLUMNS
    );
    sqlx::query_as::<_, Invoice>(&sql)
        .bind(invoice_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e))
}

async fn update_transaction(
    conn: &mut PgConnection,
    id: Uuid,
    decision: &Decision,
    payload: Option<&Value>,
) -> Result<(), DatabaseError> {
    sqlx::query(
        "UPDATE transactions
         SET status = $1,
             gateway_fee_minor = COALESCE($2, gateway_fee_minor),
             net_minor = COALESCE($3, net_minor),
             channel = COALESCE($4, channel),
             gateway_payload = COALESCE($5, gateway_payload),
             completed_at = $6,
             updated_at = NOW()
         WHERE id = $7",
    )
    .bind(decision.transaction_status)
    .bind(decision.gateway_fee_minor)
    .bind(decision.net_minor)
    .bind(&decision.channel)
    .bind(payload)
    .bind(decision.completed_at)
    .bind(id)
    .execute(conn)
    .await
    .map_err(|e| DatabaseError::from_sqlx(e))?;

    Ok(())
}

async fn update_invoice(
    conn: &mut PgConnection,
    id: Uuid,
    decision: &Decision,
    reference: &str,
) -> Result<(), DatabaseError> {
    sqlx::query(
        "UPDATE invoices
         SET status = $1, paid_date = $2, gateway_reference = $3, updated_at = NOW()
         WHERE id = $4",
    )
    .bind(decision.invoice_status)
    .bind(decision.paid_date)
    .bind(reference)
    .bind(id)
    .execute(conn)
    .await
    .map_err(|e| DatabaseError::from_sqlx(e))?;

    Ok(())
}
