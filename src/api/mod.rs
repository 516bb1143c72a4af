//! HTTP surface: the webhook endpoint and health check.

pub mod health;
pub mod webhook;

use crate::config::Config;
use crate::webhooks::receiver::WebhookReceiver;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub receiver: Arc<WebhookReceiver>,
}

/// Builds the application router. Request ids are assigned before the trace
/// layer so every request span carries one.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhook/paystack", post(webhook::receive_paystack))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
