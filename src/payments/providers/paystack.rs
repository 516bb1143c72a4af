//! Paystack payment gateway implementation
//!
//! This module integrates with Paystack's REST API for collecting invoice
//! payments in NGN. Transient failures are retried on a configured backoff
//! schedule; authentication and validation failures are returned immediately
//! because retrying them cannot succeed.

use crate::cache::{keys, ttl, Cache, RedisCache, RedisPool};
use crate::error::GatewayError;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    InitializePaymentRequest, PaymentInit, VerifiedStatus, VerifiedTransaction, DEFAULT_CHANNELS,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Paystack gateway configuration. Loaded as the `paystack` section of the
/// service [`Config`](crate::config::Config) and validated with it.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PaystackConfig {
    /// Paystack API secret key
    pub secret_key: String,
    /// Paystack API base URL (defaults to https://api.paystack.co)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// How many retries follow the first attempt
    pub max_retries: u32,
    /// Delay before each retry. Attempts beyond the schedule reuse the last
    /// entry, so the ceiling is the final element.
    pub retry_backoff: Vec<Duration>,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

/// Parses a comma-separated millisecond list, e.g. "1000,2000,4000".
/// The schedule must not decrease between entries.
pub(crate) fn parse_backoff(raw: &str) -> Result<Vec<Duration>, String> {
    let mut schedule = Vec::new();
    for part in raw.split(',') {
        let millis: u64 = part
            .trim()
            .parse()
            .map_err(|_| format!("invalid PAYSTACK_RETRY_BACKOFF_MS entry '{}'", part.trim()))?;
        let delay = Duration::from_millis(millis);
        if let Some(previous) = schedule.last() {
            if delay < *previous {
                return Err("PAYSTACK_RETRY_BACKOFF_MS entries must not decrease".to_string());
            }
        }
        schedule.push(delay);
    }
    if schedule.is_empty() {
        return Err("PAYSTACK_RETRY_BACKOFF_MS must contain at least one entry".to_string());
    }
    Ok(schedule)
}

/// Paystack gateway client
pub struct PaystackGateway {
    config: PaystackConfig,
    client: Client,
    verify_cache: Option<RedisCache>,
}

/// Envelope wrapping every Paystack response body
#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

/// `data` object of a verify response
#[derive(Debug, Deserialize)]
struct PaystackVerifyData {
    reference: String,
    amount: i64,
    status: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    fees: Option<i64>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl PaystackGateway {
    /// Create a new Paystack gateway instance
    pub fn new(config: PaystackConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            client,
            verify_cache: None,
        }
    }

    /// Serve repeated verifications of settled transactions from Redis
    pub fn with_verify_cache(mut self, pool: RedisPool) -> Self {
        self.verify_cache = Some(RedisCache::new(pool));
        self
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config
            .retry_backoff
            .get(attempt as usize)
            .or_else(|| self.config.retry_backoff.last())
            .copied()
            .unwrap_or(Duration::from_secs(1))
    }

    /// Make an authenticated request, retrying transient failures.
    ///
    /// 401 and 422 return immediately. 429 and 5xx retry on the backoff
    /// schedule until the budget runs out, as do connection-level failures.
    async fn request_json<T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", self.config.secret_key))
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let mut last_network: Option<reqwest::Error> = None;
        for attempt in 0..=self.config.max_retries {
            let req = request.try_clone().ok_or_else(|| GatewayError::InvalidResponse {
                message: "request cannot be cloned for retry".to_string(),
            })?;

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        return parse_envelope::<T>(&text);
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        error!("Paystack rejected the secret key (HTTP 401)");
                        return Err(GatewayError::Authentication);
                    }

                    if status == StatusCode::UNPROCESSABLE_ENTITY {
                        let message = envelope_message(&text);
                        warn!("Paystack rejected the request: {}", message);
                        return Err(GatewayError::Validation { message });
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt < self.config.max_retries {
                            let delay = self.backoff_delay(attempt);
                            warn!(
                                "Rate limited, retrying after {:?} (attempt {})",
                                delay,
                                attempt + 1
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(GatewayError::RateLimited {
                            attempts: attempt + 1,
                            retry_after: Some(60),
                        });
                    }

                    if status.is_server_error() {
                        if attempt < self.config.max_retries {
                            let delay = self.backoff_delay(attempt);
                            warn!(
                                "Server error {}, retrying after {:?} (attempt {})",
                                status,
                                delay,
                                attempt + 1
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(GatewayError::Unavailable {
                            status: status.as_u16(),
                            attempts: attempt + 1,
                        });
                    }

                    let message = envelope_message(&text);
                    error!("Unexpected Paystack status {}: {}", status, message);
                    return Err(GatewayError::Unexpected {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            "Request error, retrying after {:?} (attempt {}): {}",
                            delay,
                            attempt + 1,
                            e
                        );
                        last_network = Some(e);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    last_network = Some(e);
                }
            }
        }

        Err(match last_network {
            Some(source) => GatewayError::Network {
                attempts: self.config.max_retries + 1,
                source,
            },
            None => GatewayError::InvalidResponse {
                message: "retry loop exhausted without a response".to_string(),
            },
        })
    }
}

fn parse_envelope<T: DeserializeOwned>(text: &str) -> Result<T, GatewayError> {
    match serde_json::from_str::<PaystackEnvelope<T>>(text) {
        Ok(envelope) => {
            if !envelope.status {
                error!("Paystack API error: {}", envelope.message);
                return Err(GatewayError::Validation {
                    message: envelope.message,
                });
            }
            envelope.data.ok_or_else(|| GatewayError::InvalidResponse {
                message: "gateway envelope is missing its data object".to_string(),
            })
        }
        Err(e) => {
            error!("Failed to parse Paystack response: {}", e);
            Err(GatewayError::InvalidResponse {
                message: format!("invalid response format: {}", e),
            })
        }
    }
}

/// Best-effort extraction of the gateway's error message from an envelope
fn envelope_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<PaymentInit, GatewayError> {
        // Rejected locally so a bad amount never spends the retry budget
        if request.amount_minor <= 0 {
            return Err(GatewayError::Validation {
                message: format!(
                    "amount must be positive, got {} minor units",
                    request.amount_minor
                ),
            });
        }

        info!(
            "Initializing payment: {} {} {}",
            request.amount_minor, request.currency, request.reference
        );

        let channels = request.channels.unwrap_or_else(|| {
            DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect()
        });
        let mut payload = serde_json::json!({
            "email": request.email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "reference": request.reference,
            "channels": channels,
        });

        if let Some(callback_url) = request.callback_url {
            payload["callback_url"] = Value::String(callback_url);
        }

        if let Some(metadata) = request.metadata {
            payload["metadata"] = metadata;
        }

        let init: PaymentInit = self
            .request_json(Method::POST, "/transaction/initialize", Some(&payload))
            .await?;

        info!("Payment initialized: {}", init.reference);
        Ok(init)
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let cache_key = keys::verification(reference);
        if let Some(cache) = &self.verify_cache {
            match cache.get(&cache_key).await {
                Ok(Some(cached)) => {
                    debug!("Verification served from cache: {}", reference);
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => warn!("Verification cache read failed: {}", e),
            }
        }

        let endpoint = format!("/transaction/verify/{}", reference);
        let data: PaystackVerifyData = self.request_json(Method::GET, &endpoint, None).await?;

        let verified = VerifiedTransaction {
            reference: data.reference,
            status: VerifiedStatus::from_gateway(&data.status),
            amount_minor: data.amount,
            currency: data.currency,
            fees_minor: data.fees.unwrap_or(0),
            channel: data.channel,
            paid_at: data.paid_at,
            gateway_response: data.gateway_response,
            metadata: data.metadata.unwrap_or_else(|| Value::Object(Default::default())),
        };

        // Only settled outcomes are cached; a cached pending answer would
        // mask the transition the caller is polling for
        if verified.status == VerifiedStatus::Success {
            if let Some(cache) = &self.verify_cache {
                if let Err(e) = cache
                    .set(&cache_key, &verified, Some(ttl::VERIFIED_TRANSACTIONS))
                    .await
                {
                    warn!("Verification cache write failed: {}", e);
                }
            }
        }

        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PaystackConfig::default();
        assert_eq!(config.base_url, "https://api.paystack.co");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff.len(), 3);
    }

    #[test]
    fn test_parse_backoff_accepts_non_decreasing_schedules() {
        let schedule = parse_backoff("500, 1000, 1000, 4000").unwrap();
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule[0], Duration::from_millis(500));
        assert_eq!(schedule[3], Duration::from_millis(4000));
    }

    #[test]
    fn test_parse_backoff_rejects_decreasing_schedules() {
        assert!(parse_backoff("2000,1000").is_err());
        assert!(parse_backoff("").is_err());
        assert!(parse_backoff("fast").is_err());
    }

    #[test]
    fn test_backoff_delay_reuses_the_last_entry_as_ceiling() {
        let gateway = PaystackGateway::new(PaystackConfig {
            retry_backoff: vec![Duration::from_millis(10), Duration::from_millis(20)],
            ..PaystackConfig::default()
        });
        assert_eq!(gateway.backoff_delay(0), Duration::from_millis(10));
        assert_eq!(gateway.backoff_delay(1), Duration::from_millis(20));
        assert_eq!(gateway.backoff_delay(7), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_non_positive_amount_fails_before_any_request() {
        // Unroutable base URL: reaching the network would fail differently
        let gateway = PaystackGateway::new(PaystackConfig {
            secret_key: "sk_test_x".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            max_retries: 0,
            ..PaystackConfig::default()
        });

        for amount_minor in [0, -500] {
            let err = gateway
                .initialize_payment(InitializePaymentRequest {
                    email: "payer@example.edu".to_string(),
                    amount_minor,
                    currency: "NGN".to_string(),
                    reference: "ref_invalid_amount".to_string(),
                    callback_url: None,
                    channels: None,
                    metadata: None,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::Validation { .. }), "{amount_minor}");
        }
    }

    #[test]
    fn test_envelope_with_failed_status_is_a_validation_error() {
        let text = r#"{"status": false, "message": "Invalid email address"}"#;
        let err = parse_envelope::<PaymentInit>(text).unwrap_err();
        match err {
            GatewayError::Validation { message } => assert_eq!(message, "Invalid email address"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_message_falls_back_to_raw_text() {
        assert_eq!(envelope_message("<html>Bad gateway</html>"), "<html>Bad gateway</html>");
        assert_eq!(envelope_message(""), "no response body");
        assert_eq!(
            envelope_message(r#"{"status":false,"message":"Invalid key"}"#),
            "Invalid key"
        );
    }
}
