//! Pure settlement decision logic.
//!
//! [`decide`] maps one gateway event plus the current transaction and invoice
//! rows to the writes and side effects that should happen. It performs no I/O
//! and never mutates its inputs; the dispatcher owns persistence and effect
//! execution. Keeping the rules here makes every branch testable without a
//! database.

use crate::billing::model::{
    Invoice, InvoiceStatus, InvoiceType, Transaction, TransactionStatus,
};
use crate::webhooks::event::{ChargeEvent, GatewayEvent};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Acceptable gap between the charged amount and the invoice total. Covers
/// gateway rounding on fee-inclusive charges; anything larger is rejected.
pub const AMOUNT_TOLERANCE_MINOR: i64 = 1;

/// Side effects the dispatcher must run inside the settlement unit
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run the per-invoice-type post-payment hook (admissions, fees, ...)
    InvokePaidCallback {
        invoice_type: InvoiceType,
        owner_id: Uuid,
    },
    /// Keep the gateway's failure reason on the transaction row
    RecordFailureReason { reason: Option<String> },
    /// Page a human; the delivery is acknowledged but nothing was applied
    RaiseAlert(Alert),
    /// Record an outgoing settlement in the payout ledger
    RecordPayout {
        reference: String,
        amount_minor: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    AmountMismatch {
        reference: String,
        expected_minor: i64,
        received_minor: i64,
    },
    /// The invoice already settled through some other transaction
    InvoiceAlreadySettled { reference: String, invoice_id: Uuid },
}

/// How the event was resolved, independent of HTTP concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Transaction succeeded and the invoice settles
    Settled,
    /// Transaction failed; the invoice stays open for another attempt
    FailureRecorded,
    /// Reconciliation found the charge reversed before settlement
    ReversalRecorded,
    /// Transfer event routed to the payout ledger
    PayoutRouted,
    /// Transaction is already terminal; redelivery changes nothing
    AlreadyFinal,
    /// Event contradicts our records; alert raised, nothing applied
    Rejected,
    /// No transaction matches the reference
    Orphaned,
    /// Event name outside the whitelist
    Ignored,
}

/// Everything the dispatcher needs to apply one event
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub transaction_status: Option<TransactionStatus>,
    pub invoice_status: Option<InvoiceStatus>,
    pub paid_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub gateway_fee_minor: Option<i64>,
    pub net_minor: Option<i64>,
    pub channel: Option<String>,
    pub effects: Vec<Effect>,
    pub resolution: Resolution,
}

impl Decision {
    fn no_op(resolution: Resolution) -> Self {
        Self {
            transaction_status: None,
            invoice_status: None,
            paid_date: None,
            completed_at: None,
            gateway_fee_minor: None,
            net_minor: None,
            channel: None,
            effects: Vec::new(),
            resolution,
        }
    }

    fn rejected(alert: Alert) -> Self {
        let mut decision = Self::no_op(Resolution::Rejected);
        decision.effects.push(Effect::RaiseAlert(alert));
        decision
    }

    /// Whether any row changes when this decision is applied
    pub fn mutates_state(&self) -> bool {
        self.transaction_status.is_some() || self.invoice_status.is_some()
    }
}

/// Decides what one gateway event does to the matched rows.
///
/// `transaction` and `invoice` are the rows matched by the event's reference,
/// read under lock by the caller. `now` is injected so date-sensitive rules
/// stay deterministic under test.
pub fn decide(
    event: &GatewayEvent,
    transaction: Option<&Transaction>,
    invoice: Option<&Invoice>,
    now: DateTime<Utc>,
) -> Decision {
    match event {
        GatewayEvent::Unhandled { .. } => Decision::no_op(Resolution::Ignored),

        GatewayEvent::TransferSuccess(transfer) => {
            let mut decision = Decision::no_op(Resolution::PayoutRouted);
            decision.effects.push(Effect::RecordPayout {
                reference: transfer.reference.clone(),
                amount_minor: transfer.amount_minor,
            });
            decision
        }

        GatewayEvent::ChargeSuccess(charge) => match (transaction, invoice) {
            (Some(tx), Some(inv)) => decide_charge_success(charge, tx, inv, now),
            _ => Decision::no_op(Resolution::Orphaned),
        },

        GatewayEvent::ChargeFailed(charge) => match transaction {
            Some(tx) => decide_charge_terminal(
                charge,
                tx,
                TransactionStatus::Failed,
                Resolution::FailureRecorded,
                now,
            ),
            None => Decision::no_op(Resolution::Orphaned),
        },

        GatewayEvent::ChargeReversed(charge) => match transaction {
            Some(tx) => decide_charge_terminal(
                charge,
                tx,
                TransactionStatus::Reversed,
                Resolution::ReversalRecorded,
                now,
            ),
            None => Decision::no_op(Resolution::Orphaned),
        },
    }
}

fn decide_charge_success(
    charge: &ChargeEvent,
    tx: &Transaction,
    invoice: &Invoice,
    now: DateTime<Utc>,
) -> Decision {
    if tx.is_terminal() {
        return Decision::no_op(Resolution::AlreadyFinal);
    }

    // A pending transaction against an invoice that settled through another
    // channel: applying this charge would double-pay the invoice.
    if invoice.status == InvoiceStatus::Paid {
        return Decision::rejected(Alert::InvoiceAlreadySettled {
            reference: tx.reference.clone(),
            invoice_id: invoice.id,
        });
    }

    if (charge.amount_minor - invoice.total_minor).abs() > AMOUNT_TOLERANCE_MINOR {
        return Decision::rejected(Alert::AmountMismatch {
            reference: tx.reference.clone(),
            expected_minor: invoice.total_minor,
            received_minor: charge.amount_minor,
        });
    }

    let net_minor = (tx.amount_minor - tx.platform_fee_minor - charge.fees_minor).max(0);

    Decision {
        transaction_status: Some(TransactionStatus::Success),
        invoice_status: Some(InvoiceStatus::Paid),
        paid_date: Some(now.date_naive()),
        completed_at: Some(now),
        gateway_fee_minor: Some(charge.fees_minor),
        net_minor: Some(net_minor),
        channel: charge.channel.clone(),
        effects: vec![Effect::InvokePaidCallback {
            invoice_type: invoice.invoice_type,
            owner_id: invoice.owner_id,
        }],
        resolution: Resolution::Settled,
    }
}

/// Shared path for failure and reversal: the transaction closes, the invoice
/// stays as it is so the owner can retry payment.
fn decide_charge_terminal(
    charge: &ChargeEvent,
    tx: &Transaction,
    status: TransactionStatus,
    resolution: Resolution,
    now: DateTime<Utc>,
) -> Decision {
    if tx.is_terminal() {
        return Decision::no_op(Resolution::AlreadyFinal);
    }

    Decision {
        transaction_status: Some(status),
        invoice_status: None,
        paid_date: None,
        completed_at: Some(now),
        gateway_fee_minor: None,
        net_minor: None,
        channel: None,
        effects: vec![Effect::RecordFailureReason {
            reason: charge.gateway_response.clone(),
        }],
        resolution,
    }
}

/// Time-based invoice aging, applied by the sweeper rather than by payment
/// events. An invoice is overdue once its due date has fully elapsed.
pub fn due_transition(invoice: &Invoice, today: NaiveDate) -> Option<InvoiceStatus> {
    if invoice.status == InvoiceStatus::Sent && invoice.due_date < today {
        Some(InvoiceStatus::Overdue)
    } else {
        None
    }
}
