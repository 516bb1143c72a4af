//! Application-level error types.
//!
//! Each subsystem carries its own error enum (`SecurityError`, `EffectError`,
//! `DatabaseError`, `CacheError`); `AppError` aggregates them for callers that
//! sit above subsystem boundaries, such as the payment service.

use crate::billing::error::EffectError;
use crate::cache::error::CacheError;
use crate::database::error::DatabaseError;
use crate::webhooks::error::SecurityError;
use std::fmt;
use thiserror::Error;

/// Result type for application-level operations
pub type AppResult<T> = Result<T, AppError>;

/// Gateway call failure, classified so callers know what is safe to retry
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway rejected the request as malformed or invalid (HTTP 422 or
    /// an envelope-level failure). Retrying the same request cannot succeed.
    #[error("gateway rejected the request: {message}")]
    Validation { message: String },

    /// HTTP 401: the configured secret key is wrong or revoked
    #[error("gateway authentication failed; check the secret key")]
    Authentication,

    /// HTTP 429 persisted through the retry budget
    #[error("gateway rate limit hit after {attempts} attempts")]
    RateLimited {
        attempts: u32,
        retry_after: Option<u64>,
    },

    /// HTTP 5xx persisted through the retry budget
    #[error("gateway unavailable (HTTP {status}) after {attempts} attempts")]
    Unavailable { status: u16, attempts: u32 },

    /// Timeout or connection failure persisted through the retry budget
    #[error("gateway request failed after {attempts} attempts: {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// A 2xx response whose body did not match the expected shape
    #[error("unexpected gateway response: {message}")]
    InvalidResponse { message: String },

    /// Any other HTTP status the classification does not cover
    #[error("gateway returned HTTP {status}: {message}")]
    Unexpected { status: u16, message: String },
}

impl GatewayError {
    /// Whether a fresh attempt at a later time could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. }
                | GatewayError::Unavailable { .. }
                | GatewayError::Network { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Top-level application error with optional call-site context
#[derive(Debug)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::new(AppErrorKind::Configuration {
            message: message.into(),
        })
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Gateway(e) => e.is_retryable(),
            AppErrorKind::Database(e) => e.is_retryable(),
            AppErrorKind::Cache(_) => true,
            AppErrorKind::Security(_)
            | AppErrorKind::Effect(_)
            | AppErrorKind::Configuration { .. } => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<SecurityError> for AppError {
    fn from(e: SecurityError) -> Self {
        Self::new(AppErrorKind::Security(e))
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        Self::new(AppErrorKind::Gateway(e))
    }
}

impl From<EffectError> for AppError {
    fn from(e: EffectError) -> Self {
        Self::new(AppErrorKind::Effect(e))
    }
}

impl From<DatabaseError> for AppError {
    fn from(e: DatabaseError) -> Self {
        Self::new(AppErrorKind::Database(e))
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        Self::new(AppErrorKind::Cache(e))
    }
}
