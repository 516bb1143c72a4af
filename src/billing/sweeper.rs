//! Background aging of invoices and transactions.
//!
//! Two time-based transitions happen on a timer rather than on payment
//! events: sent invoices past their due date become overdue, and pending
//! transactions whose checkout session can no longer complete are closed as
//! abandoned. One sweeper task runs both on a shared interval. With a
//! reconciler attached, stale pendings are checked against the gateway first
//! so a payment whose webhook was missed settles instead of being abandoned.

use crate::billing::service::InvoicePayments;
use crate::database::invoice_repository::InvoiceRepository;
use crate::database::transaction_repository::TransactionRepository;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Stale pendings reconciled per sweep; the rest wait for the next tick
const RECONCILE_BATCH: i64 = 100;

pub struct BillingSweeper {
    invoices: InvoiceRepository,
    transactions: TransactionRepository,
    reconciler: Option<Arc<InvoicePayments>>,
    interval: Duration,
    pending_timeout: Duration,
}

impl BillingSweeper {
    pub fn new(pool: PgPool, interval: Duration, pending_timeout: Duration) -> Self {
        Self {
            invoices: InvoiceRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool),
            reconciler: None,
            interval,
            pending_timeout,
        }
    }

    /// Verify stale pendings with the gateway before abandoning them
    pub fn with_reconciler(mut self, reconciler: Arc<InvoicePayments>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Runs sweeps until the shutdown signal flips. The first sweep happens
    /// immediately so a restart catches up on missed aging.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            pending_timeout_secs = self.pending_timeout.as_secs(),
            "Billing sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Billing sweeper stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One aging pass. Each sweep is independently fault tolerant; a failed
    /// pass is retried on the next tick.
    pub async fn sweep_once(&self) {
        match self.invoices.mark_overdue(Utc::now().date_naive()).await {
            Ok(0) => {}
            Ok(count) => {
                info!(count, "Marked sent invoices overdue");
                metrics::counter!("invoices_marked_overdue_total").increment(count);
            }
            Err(e) => warn!("Overdue invoice sweep failed: {}", e),
        }

        let cutoff = Utc::now() - chrono::Duration::seconds(self.pending_timeout.as_secs() as i64);

        // Settlements the gateway knows about are applied through the normal
        // dispatch path; whatever is still pending afterwards gets abandoned.
        if let Some(reconciler) = &self.reconciler {
            match self
                .transactions
                .stale_pending_references(cutoff, RECONCILE_BATCH)
                .await
            {
                Ok(references) => {
                    for reference in references {
                        match reconciler.reconcile(&reference).await {
                            Ok(outcome) => info!(
                                reference = %reference,
                                ?outcome,
                                "Reconciled stale pending transaction"
                            ),
                            Err(e) => warn!(
                                reference = %reference,
                                "Reconcile failed, row left for the abandon pass: {}", e
                            ),
                        }
                    }
                }
                Err(e) => warn!("Stale pending scan failed: {}", e),
            }
        }

        match self.transactions.abandon_stale(cutoff).await {
            Ok(0) => {}
            Ok(count) => {
                info!(count, "Closed stale pending transactions as abandoned");
                metrics::counter!("transactions_abandoned_total").increment(count);
            }
            Err(e) => warn!("Stale transaction sweep failed: {}", e),
        }
    }
}
