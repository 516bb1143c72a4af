use crate::payments::providers::paystack::{parse_backoff, PaystackConfig};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub paystack: PaystackConfig,
    pub webhook: WebhookConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Inbound webhook settings.
///
/// The signing secret is optional at startup so the service can come up for
/// health checks before the gateway account is provisioned; the webhook
/// endpoint answers 500 until it is set.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub idempotency_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    pub default_currency: String,
    pub sweep_interval_secs: u64,
    pub pending_timeout_secs: u64,
}

impl WebhookConfig {
    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }
}

impl BillingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let redis = RedisConfig {
            url: env::var("REDIS_URL").context("REDIS_URL not set")?,
        };

        let paystack = PaystackConfig {
            secret_key: env::var("PAYSTACK_SECRET_KEY").context("PAYSTACK_SECRET_KEY not set")?,
            base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            timeout_secs: env::var("PAYSTACK_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("PAYSTACK_TIMEOUT_SECS must be a valid number")?,
            max_retries: env::var("PAYSTACK_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("PAYSTACK_MAX_RETRIES must be a valid number")?,
            retry_backoff: match env::var("PAYSTACK_RETRY_BACKOFF_MS") {
                Ok(raw) => parse_backoff(&raw).map_err(|e| anyhow!(e))?,
                Err(_) => PaystackConfig::default().retry_backoff,
            },
        };

        let webhook = WebhookConfig {
            secret: env::var("PAYSTACK_WEBHOOK_SECRET")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            idempotency_ttl_secs: env::var("WEBHOOK_IDEMPOTENCY_TTL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .context("WEBHOOK_IDEMPOTENCY_TTL_SECS must be a valid number")?,
        };

        let billing = BillingConfig {
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "NGN".to_string()),
            sweep_interval_secs: env::var("BILLING_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("BILLING_SWEEP_INTERVAL_SECS must be a valid number")?,
            pending_timeout_secs: env::var("BILLING_PENDING_TIMEOUT_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .context("BILLING_PENDING_TIMEOUT_SECS must be a valid number")?,
        };

        let config = Config {
            server,
            database,
            redis,
            paystack,
            webhook,
            billing,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        // Validate URLs are not empty
        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.redis.url.trim().is_empty() {
            return Err(anyhow!("REDIS_URL cannot be empty"));
        }

        // Validate gateway settings
        if self.paystack.secret_key.trim().is_empty() {
            return Err(anyhow!("PAYSTACK_SECRET_KEY cannot be empty"));
        }

        if self.paystack.base_url.trim().is_empty() {
            return Err(anyhow!("PAYSTACK_BASE_URL cannot be empty"));
        }

        if self.paystack.timeout_secs == 0 {
            return Err(anyhow!("PAYSTACK_TIMEOUT_SECS must be greater than 0"));
        }

        if self.paystack.retry_backoff.is_empty() {
            return Err(anyhow!(
                "PAYSTACK_RETRY_BACKOFF_MS must contain at least one entry"
            ));
        }

        if self.billing.default_currency.trim().is_empty() {
            return Err(anyhow!("DEFAULT_CURRENCY cannot be empty"));
        }

        // Validate database max connections
        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        // Validate timing knobs
        if self.webhook.idempotency_ttl_secs == 0 {
            return Err(anyhow!("WEBHOOK_IDEMPOTENCY_TTL_SECS must be greater than 0"));
        }

        if self.billing.sweep_interval_secs == 0 {
            return Err(anyhow!("BILLING_SWEEP_INTERVAL_SECS must be greater than 0"));
        }

        if self.billing.pending_timeout_secs == 0 {
            return Err(anyhow!("BILLING_PENDING_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }
}
