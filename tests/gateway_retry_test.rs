//! Gateway client retry and classification tests.
//!
//! Runs the real Paystack client against an in-process stub server that
//! scripts one response per attempt, so attempt counts, backoff ordering and
//! error classification are observable without the real gateway.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use edusuite_payments::error::GatewayError;
use edusuite_payments::payments::types::{InitializePaymentRequest, VerifiedStatus};
use edusuite_payments::payments::{PaymentGateway, PaystackGateway};
use edusuite_payments::payments::providers::paystack::PaystackConfig;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Scripted gateway: each request pops the next response; once the script is
/// exhausted every further request gets the fallback.
struct StubGateway {
    hits: Mutex<Vec<Instant>>,
    script: Mutex<VecDeque<(StatusCode, Value)>>,
    fallback: (StatusCode, Value),
}

impl StubGateway {
    fn new(script: Vec<(StatusCode, Value)>, fallback: (StatusCode, Value)) -> Arc<Self> {
        Arc::new(Self {
            hits: Mutex::new(Vec::new()),
            script: Mutex::new(script.into_iter().collect()),
            fallback,
        })
    }

    fn hits(&self) -> Vec<Instant> {
        self.hits.lock().unwrap().clone()
    }
}

async fn respond(State(stub): State<Arc<StubGateway>>) -> (StatusCode, Json<Value>) {
    stub.hits.lock().unwrap().push(Instant::now());
    let (status, body) = stub
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| stub.fallback.clone());
    (status, Json(body))
}

async fn serve(stub: Arc<StubGateway>) -> SocketAddr {
    let app = Router::new()
        .route("/transaction/initialize", post(respond))
        .route("/transaction/verify/:reference", get(respond))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn gateway(addr: SocketAddr, max_retries: u32) -> PaystackGateway {
    PaystackGateway::new(PaystackConfig {
        secret_key: "sk_test_stub".to_string(),
        base_url: format!("http://{addr}"),
        timeout_secs: 5,
        max_retries,
        retry_backoff: vec![Duration::from_millis(50), Duration::from_millis(100)],
    })
}

fn init_request() -> InitializePaymentRequest {
    InitializePaymentRequest {
        email: "payer@example.edu".to_string(),
        amount_minor: 500_000,
        currency: "NGN".to_string(),
        reference: "INV-1_1700000000_stub0001".to_string(),
        callback_url: None,
        channels: None,
        metadata: Some(json!({"invoice_number": "INV-1"})),
    }
}

fn init_success() -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc123",
                "access_code": "abc123",
                "reference": "INV-1_1700000000_stub0001"
            }
        }),
    )
}

fn server_error() -> (StatusCode, Value) {
    (
        StatusCode::BAD_GATEWAY,
        json!({"status": false, "message": "Server error"}),
    )
}

#[tokio::test]
async fn test_transient_server_errors_are_retried_to_success() {
    let stub = StubGateway::new(vec![server_error(), server_error()], init_success());
    let addr = serve(stub.clone()).await;

    let init = gateway(addr, 3).initialize_payment(init_request()).await.unwrap();

    assert_eq!(init.authorization_url, "https://checkout.paystack.com/abc123");
    assert_eq!(stub.hits().len(), 3);
}

#[tokio::test]
async fn test_retry_ceiling_bounds_attempts_and_delays_do_not_decrease() {
    let stub = StubGateway::new(Vec::new(), server_error());
    let addr = serve(stub.clone()).await;

    let err = gateway(addr, 2).initialize_payment(init_request()).await.unwrap_err();

    assert!(err.is_retryable());
    match err {
        GatewayError::Unavailable { status, attempts } => {
            assert_eq!(status, 502);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected unavailable, got {other:?}"),
    }

    let hits = stub.hits();
    assert_eq!(hits.len(), 3);
    let first_gap = hits[1] - hits[0];
    let second_gap = hits[2] - hits[1];
    // Schedule is 50ms then 100ms; allow scheduler jitter but never a shrink
    assert!(first_gap >= Duration::from_millis(40), "{first_gap:?}");
    assert!(
        second_gap + Duration::from_millis(10) >= first_gap,
        "{first_gap:?} then {second_gap:?}"
    );
}

#[tokio::test]
async fn test_unauthorized_is_fatal_on_the_first_attempt() {
    let stub = StubGateway::new(
        Vec::new(),
        (
            StatusCode::UNAUTHORIZED,
            json!({"status": false, "message": "Invalid key"}),
        ),
    );
    let addr = serve(stub.clone()).await;

    let err = gateway(addr, 3).initialize_payment(init_request()).await.unwrap_err();

    assert!(!err.is_retryable());
    assert!(matches!(err, GatewayError::Authentication));
    assert_eq!(stub.hits().len(), 1);
}

#[tokio::test]
async fn test_unprocessable_request_surfaces_the_gateway_message() {
    let stub = StubGateway::new(
        Vec::new(),
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"status": false, "message": "Invalid email address"}),
        ),
    );
    let addr = serve(stub.clone()).await;

    let err = gateway(addr, 3).initialize_payment(init_request()).await.unwrap_err();

    match err {
        GatewayError::Validation { message } => assert_eq!(message, "Invalid email address"),
        other => panic!("expected validation, got {other:?}"),
    }
    assert_eq!(stub.hits().len(), 1);
}

#[tokio::test]
async fn test_persistent_rate_limiting_exhausts_the_budget() {
    let stub = StubGateway::new(
        Vec::new(),
        (
            StatusCode::TOO_MANY_REQUESTS,
            json!({"status": false, "message": "Too many requests"}),
        ),
    );
    let addr = serve(stub.clone()).await;

    let err = gateway(addr, 1).initialize_payment(init_request()).await.unwrap_err();

    match err {
        GatewayError::RateLimited { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected rate limited, got {other:?}"),
    }
    assert_eq!(stub.hits().len(), 2);
}

#[tokio::test]
async fn test_rate_limit_then_recovery_succeeds_within_budget() {
    let stub = StubGateway::new(
        vec![(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"status": false, "message": "Too many requests"}),
        )],
        init_success(),
    );
    let addr = serve(stub.clone()).await;

    let init = gateway(addr, 3).initialize_payment(init_request()).await.unwrap();

    assert_eq!(init.access_code, "abc123");
    assert_eq!(stub.hits().len(), 2);
}

#[tokio::test]
async fn test_verify_maps_gateway_truth_into_typed_fields() {
    let stub = StubGateway::new(
        Vec::new(),
        (
            StatusCode::OK,
            json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "reference": "INV-1_1700000000_stub0001",
                    "amount": 500_000,
                    "status": "success",
                    "currency": "NGN",
                    "fees": 7_500,
                    "channel": "bank",
                    "paid_at": "2024-11-14T20:15:00.000Z",
                    "gateway_response": "Approved",
                    "metadata": {"invoice_number": "INV-1"}
                }
            }),
        ),
    );
    let addr = serve(stub.clone()).await;

    let verified = gateway(addr, 0)
        .verify_transaction("INV-1_1700000000_stub0001")
        .await
        .unwrap();

    assert_eq!(verified.status, VerifiedStatus::Success);
    assert_eq!(verified.amount_minor, 500_000);
    assert_eq!(verified.fees_minor, 7_500);
    assert_eq!(verified.channel.as_deref(), Some("bank"));
    assert_eq!(stub.hits().len(), 1);
}

#[tokio::test]
async fn test_envelope_failure_on_200_is_a_validation_error() {
    let stub = StubGateway::new(
        Vec::new(),
        (
            StatusCode::OK,
            json!({"status": false, "message": "Transaction reference not found"}),
        ),
    );
    let addr = serve(stub.clone()).await;

    let err = gateway(addr, 3)
        .verify_transaction("ref_unknown")
        .await
        .unwrap_err();

    match err {
        GatewayError::Validation { message } => {
            assert_eq!(message, "Transaction reference not found")
        }
        other => panic!("expected validation, got {other:?}"),
    }
    // Envelope-level refusals are not retried
    assert_eq!(stub.hits().len(), 1);
}
