//! Redis-backed cache and cross-process guards.

pub mod cache;
pub mod error;
pub mod keys;

// Re-export commonly used items
pub use cache::{ttl, Cache, RedisCache};
pub use error::{CacheError, CacheResult};

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tracing::{info, warn};

pub type RedisPool = Pool<RedisConnectionManager>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 20,
            min_idle: 5,
            connection_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Builds the bb8 pool and probes it with one PING. A failed probe is logged
/// but not fatal: the verify cache degrades gracefully and the idempotency
/// guard reports its own errors per delivery.
pub async fn init_cache_pool(config: CacheConfig) -> Result<RedisPool, CacheError> {
    info!(
        redis_url = %config.redis_url,
        max_connections = config.max_connections,
        "Connecting Redis pool"
    );

    let manager = RedisConnectionManager::new(config.redis_url.clone())
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_idle))
        .connection_timeout(config.connection_timeout)
        .max_lifetime(Some(config.max_lifetime))
        .idle_timeout(Some(config.idle_timeout))
        .test_on_check_out(false)
        .build(manager)
        .await
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

    match ping(&pool).await {
        Ok(()) => info!("Redis pool ready"),
        Err(e) => warn!("Redis unreachable at startup, continuing: {}", e),
    }

    Ok(pool)
}

async fn ping(pool: &RedisPool) -> Result<(), CacheError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
    let _: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
    Ok(())
}
