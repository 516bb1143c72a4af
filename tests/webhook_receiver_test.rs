//! End-to-end webhook pipeline tests.
//!
//! Drives the full receiver (signature check, parsing, duplicate
//! suppression, settlement decisions, idempotency marks) against an
//! in-memory effect dispatcher that applies the real settlement decisions to
//! hash maps. No external services required.

use async_trait::async_trait;
use chrono::Utc;
use edusuite_payments::billing::dispatcher::{DispatchOutcome, EffectDispatcher};
use edusuite_payments::billing::error::EffectError;
use edusuite_payments::billing::model::{
    Invoice, InvoiceStatus, InvoiceType, Transaction, TransactionStatus,
};
use edusuite_payments::billing::state_machine::{decide, Effect, Resolution};
use edusuite_payments::webhooks::error::{ReceiverError, SecurityError};
use edusuite_payments::webhooks::event::GatewayEvent;
use edusuite_payments::webhooks::idempotency::MemoryIdempotencyStore;
use edusuite_payments::webhooks::receiver::{WebhookOutcome, WebhookReceiver};
use edusuite_payments::webhooks::security::{sign_body, WebhookVerifier};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const SECRET: &str = "whsec_e2e_test";
const INVOICE_NUMBER: &str = "INV-2024-0042";
const REFERENCE: &str = "INV-2024-0042_1700000000_ab12cd34";
const INVOICE_TOTAL: i64 = 500_000;

#[derive(Default)]
struct SharedState {
    transactions: HashMap<String, Transaction>,
    invoices: HashMap<Uuid, Invoice>,
    callback_invocations: Vec<Uuid>,
    payouts: Vec<(String, i64)>,
    alerts: usize,
}

/// Applies settlement decisions to in-memory maps with the same
/// all-or-nothing semantics as the database dispatcher: when effects are
/// failing, nothing is applied.
struct MemoryDispatcher {
    state: Arc<Mutex<SharedState>>,
    fail_effects: AtomicBool,
}

#[async_trait]
impl EffectDispatcher for MemoryDispatcher {
    async fn dispatch(&self, event: &GatewayEvent) -> Result<DispatchOutcome, EffectError> {
        let mut state = self.state.lock().await;

        if let GatewayEvent::Unhandled { .. } = event {
            return Ok(DispatchOutcome::Ignored);
        }
        if let GatewayEvent::TransferSuccess(_) = event {
            let decision = decide(event, None, None, Utc::now());
            for effect in &decision.effects {
                if let Effect::RecordPayout {
                    reference,
                    amount_minor,
                } = effect
                {
                    state.payouts.push((reference.clone(), *amount_minor));
                }
            }
            return Ok(DispatchOutcome::PayoutRouted);
        }

        let Some(reference) = event.reference() else {
            return Ok(DispatchOutcome::Orphaned);
        };
        let Some(mut tx) = state.transactions.get(reference).cloned() else {
            return Ok(DispatchOutcome::Orphaned);
        };
        let invoice = state.invoices.get(&tx.invoice_id).cloned();

        let decision = decide(event, Some(&tx), invoice.as_ref(), Utc::now());
        match decision.resolution {
            Resolution::AlreadyFinal => Ok(DispatchOutcome::AlreadyApplied),
            Resolution::Rejected => {
                for effect in &decision.effects {
                    if matches!(effect, Effect::RaiseAlert(_)) {
                        state.alerts += 1;
                    }
                }
                Ok(DispatchOutcome::Rejected)
            }
            Resolution::Orphaned => Ok(DispatchOutcome::Orphaned),
            Resolution::Ignored | Resolution::PayoutRouted => Ok(DispatchOutcome::Ignored),
            Resolution::Settled | Resolution::FailureRecorded | Resolution::ReversalRecorded => {
                if self.fail_effects.load(Ordering::SeqCst) {
                    return Err(EffectError::callback(
                        InvoiceType::SchoolFees,
                        "simulated callback outage",
                    ));
                }

                if let Some(status) = decision.transaction_status {
                    tx.status = status;
                    tx.completed_at = decision.completed_at;
                    if let Some(fee) = decision.gateway_fee_minor {
                        tx.gateway_fee_minor = fee;
                    }
                    if let Some(net) = decision.net_minor {
                        tx.net_minor = net;
                    }
                    if let Some(channel) = decision.channel.clone() {
                        tx.channel = Some(channel);
                    }
                }
                for effect in &decision.effects {
                    match effect {
                        Effect::InvokePaidCallback { owner_id, .. } => {
                            state.callback_invocations.push(*owner_id);
                        }
                        Effect::RecordFailureReason { reason } => {
                            tx.gateway_response = reason.clone();
                        }
                        Effect::RecordPayout {
                            reference,
                            amount_minor,
                        } => {
                            state.payouts.push((reference.clone(), *amount_minor));
                        }
                        Effect::RaiseAlert(_) => state.alerts += 1,
                    }
                }
                if let (Some(inv_status), Some(mut inv)) = (decision.invoice_status, invoice) {
                    inv.status = inv_status;
                    inv.paid_date = decision.paid_date;
                    inv.gateway_reference = Some(tx.reference.clone());
                    state.invoices.insert(inv.id, inv);
                }
                state.transactions.insert(reference.to_string(), tx);
                Ok(DispatchOutcome::Applied)
            }
        }
    }
}

struct Harness {
    receiver: WebhookReceiver,
    state: Arc<Mutex<SharedState>>,
    dispatcher: Arc<MemoryDispatcher>,
}

fn harness() -> Harness {
    let now = Utc::now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        invoice_number: INVOICE_NUMBER.to_string(),
        invoice_type: InvoiceType::SchoolFees,
        owner_id: Uuid::new_v4(),
        currency: "NGN".to_string(),
        total_minor: INVOICE_TOTAL,
        platform_fee_minor: 10_000,
        status: InvoiceStatus::Sent,
        due_date: now.date_naive(),
        paid_date: None,
        gateway_reference: None,
        created_at: now,
        updated_at: now,
    };
    let transaction = Transaction::new_pending(&invoice, REFERENCE, json!({}));

    let mut shared = SharedState::default();
    shared.transactions.insert(REFERENCE.to_string(), transaction);
    shared.invoices.insert(invoice.id, invoice);
    let state = Arc::new(Mutex::new(shared));

    let dispatcher = Arc::new(MemoryDispatcher {
        state: state.clone(),
        fail_effects: AtomicBool::new(false),
    });
    let receiver = WebhookReceiver::new(
        WebhookVerifier::new(Some(SECRET.to_string())),
        Arc::new(MemoryIdempotencyStore::new()),
        dispatcher.clone(),
        Duration::from_secs(600),
    );

    Harness {
        receiver,
        state,
        dispatcher,
    }
}

fn charge_delivery(event: &str, delivery_id: u64, amount: i64) -> (Vec<u8>, String) {
    let body = json!({
        "event": event,
        "id": delivery_id,
        "data": {
            "reference": REFERENCE,
            "amount": amount,
            "currency": "NGN",
            "status": if event == "charge.success" { "success" } else { "failed" },
            "channel": "card",
            "fees": 7_500,
            "gateway_response": if event == "charge.success" { "Approved" } else { "Insufficient funds" },
        }
    })
    .to_string()
    .into_bytes();
    let signature = sign_body(SECRET, &body);
    (body, signature)
}

#[tokio::test]
async fn test_settlement_marks_transaction_invoice_and_callback_once() {
    let h = harness();
    let (body, signature) = charge_delivery("charge.success", 1001, INVOICE_TOTAL);

    let outcome = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let state = h.state.lock().await;
    let tx = &state.transactions[REFERENCE];
    assert_eq!(tx.status, TransactionStatus::Success);
    assert_eq!(tx.gateway_fee_minor, 7_500);
    // 500_000 - 10_000 platform - 7_500 gateway
    assert_eq!(tx.net_minor, 482_500);
    let invoice = state.invoices.values().next().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    assert_eq!(invoice.gateway_reference.as_deref(), Some(REFERENCE));
    assert!(invoice.paid_date.is_some());
    assert_eq!(state.callback_invocations.len(), 1);
}

#[tokio::test]
async fn test_exact_redelivery_is_suppressed_without_side_effects() {
    let h = harness();
    let (body, signature) = charge_delivery("charge.success", 1002, INVOICE_TOTAL);

    let first = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    let second = h.receiver.handle(&body, Some(&signature)).await.unwrap();

    assert_eq!(first, WebhookOutcome::Processed);
    assert_eq!(second, WebhookOutcome::Duplicate);
    assert_eq!(h.state.lock().await.callback_invocations.len(), 1);
}

#[tokio::test]
async fn test_tampered_body_is_rejected_and_state_is_untouched() {
    let h = harness();
    let (body, signature) = charge_delivery("charge.success", 1003, INVOICE_TOTAL);
    // Inflate the amount after signing
    let tampered = String::from_utf8(body).unwrap().replace("500000", "900000");

    let err = h
        .receiver
        .handle(tampered.as_bytes(), Some(&signature))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReceiverError::Security(SecurityError::InvalidSignature)
    ));

    let state = h.state.lock().await;
    assert_eq!(state.transactions[REFERENCE].status, TransactionStatus::Pending);
    assert!(state.callback_invocations.is_empty());
}

#[tokio::test]
async fn test_amount_mismatch_raises_alert_and_withholds_settlement() {
    let h = harness();
    // NGN 50 short of the invoice total
    let (body, signature) = charge_delivery("charge.success", 1004, INVOICE_TOTAL - 5_000);

    let outcome = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Rejected);

    let state = h.state.lock().await;
    assert_eq!(state.alerts, 1);
    assert_eq!(state.transactions[REFERENCE].status, TransactionStatus::Pending);
    let invoice = state.invoices.values().next().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Sent);
    assert!(state.callback_invocations.is_empty());
}

#[tokio::test]
async fn test_one_minor_unit_of_rounding_still_settles() {
    let h = harness();
    let (body, signature) = charge_delivery("charge.success", 1005, INVOICE_TOTAL - 1);

    let outcome = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);
    assert_eq!(
        h.state.lock().await.invoices.values().next().unwrap().status,
        InvoiceStatus::Paid
    );
}

#[tokio::test]
async fn test_effect_failure_is_retried_by_redelivery() {
    let h = harness();
    h.dispatcher.fail_effects.store(true, Ordering::SeqCst);
    let (body, signature) = charge_delivery("charge.success", 1006, INVOICE_TOTAL);

    let err = h.receiver.handle(&body, Some(&signature)).await.unwrap_err();
    assert!(matches!(err, ReceiverError::Effect(_)));
    {
        let state = h.state.lock().await;
        assert_eq!(state.transactions[REFERENCE].status, TransactionStatus::Pending);
        assert!(state.callback_invocations.is_empty());
    }

    // The outage ends; the gateway redelivers the same body
    h.dispatcher.fail_effects.store(false, Ordering::SeqCst);
    let outcome = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let state = h.state.lock().await;
    assert_eq!(state.transactions[REFERENCE].status, TransactionStatus::Success);
    assert_eq!(state.callback_invocations.len(), 1);
}

#[tokio::test]
async fn test_concurrent_distinct_deliveries_settle_exactly_once() {
    let h = harness();
    let (body_a, sig_a) = charge_delivery("charge.success", 2001, INVOICE_TOTAL);
    let (body_b, sig_b) = charge_delivery("charge.success", 2002, INVOICE_TOTAL);

    let (a, b) = tokio::join!(
        h.receiver.handle(&body_a, Some(&sig_a)),
        h.receiver.handle(&body_b, Some(&sig_b)),
    );
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| format!("{o:?}"));
    assert_eq!(outcomes, vec![WebhookOutcome::Duplicate, WebhookOutcome::Processed]);

    let state = h.state.lock().await;
    assert_eq!(state.callback_invocations.len(), 1);
    assert_eq!(state.transactions[REFERENCE].status, TransactionStatus::Success);
}

#[tokio::test]
async fn test_charge_failed_closes_transaction_and_keeps_invoice_open() {
    let h = harness();
    let (body, signature) = charge_delivery("charge.failed", 1007, INVOICE_TOTAL);

    let outcome = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let state = h.state.lock().await;
    let tx = &state.transactions[REFERENCE];
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.gateway_response.as_deref(), Some("Insufficient funds"));
    // The invoice stays open so the payer can try again
    assert_eq!(
        state.invoices.values().next().unwrap().status,
        InvoiceStatus::Sent
    );
    assert!(state.callback_invocations.is_empty());
}

#[tokio::test]
async fn test_orphaned_reference_is_acknowledged_and_marked() {
    let h = harness();
    let body = json!({
        "event": "charge.success",
        "id": 1008,
        "data": {"reference": "ref_nobody_knows", "amount": 1_000, "status": "success"}
    })
    .to_string()
    .into_bytes();
    let signature = sign_body(SECRET, &body);

    let first = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(first, WebhookOutcome::Ignored);

    // Benign no-ops still mark the delivery as processed
    let second = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(second, WebhookOutcome::Duplicate);
}

#[tokio::test]
async fn test_unknown_event_type_is_acknowledged_untouched() {
    let h = harness();
    let body = json!({
        "event": "subscription.disable",
        "id": 1009,
        "data": {"subscription_code": "SUB_x"}
    })
    .to_string()
    .into_bytes();
    let signature = sign_body(SECRET, &body);

    let outcome = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);
    assert_eq!(
        h.state.lock().await.transactions[REFERENCE].status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_transfer_success_routes_to_payout_ledger_only() {
    let h = harness();
    let body = json!({
        "event": "transfer.success",
        "id": 1010,
        "data": {"reference": "payout_batch_7", "amount": 2_400_000, "status": "success"}
    })
    .to_string()
    .into_bytes();
    let signature = sign_body(SECRET, &body);

    let outcome = h.receiver.handle(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let state = h.state.lock().await;
    assert_eq!(state.payouts, vec![("payout_batch_7".to_string(), 2_400_000)]);
    // Invoices and transactions are untouched by transfer confirmations
    assert_eq!(state.transactions[REFERENCE].status, TransactionStatus::Pending);
    assert_eq!(
        state.invoices.values().next().unwrap().status,
        InvoiceStatus::Sent
    );
}
