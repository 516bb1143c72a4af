//! Webhook HTTP endpoint.
//!
//! The handler takes the body as raw bytes because the signature covers them
//! exactly as sent; any middleware that reshapes the body would break
//! verification.
//!
//! Status mapping drives the gateway's redelivery: 200 acknowledges (even
//! for duplicates and no-ops), 4xx rejects the delivery itself, 5xx asks for
//! redelivery after an internal failure.

use crate::api::AppState;
use crate::webhooks::error::ReceiverError;
use crate::webhooks::event::SIGNATURE_HEADER;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::error;

pub async fn receive_paystack(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.receiver.handle(&body, signature).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "success"}))),
        Err(e) => {
            let status = status_of(&e);
            if status.is_server_error() {
                error!("Webhook processing failed: {}", e);
                // Internal failure detail stays out of the response body
                (
                    status,
                    Json(json!({"status": "error", "message": "internal error"})),
                )
            } else {
                (status, Json(json!({"status": "error", "message": e.to_string()})))
            }
        }
    }
}

fn status_of(error: &ReceiverError) -> StatusCode {
    match error {
        ReceiverError::Security(e) if e.is_signature_failure() => StatusCode::UNAUTHORIZED,
        ReceiverError::Security(_) => StatusCode::BAD_REQUEST,
        ReceiverError::MissingSecret | ReceiverError::Effect(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
