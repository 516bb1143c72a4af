//! Generic JSON cache over Redis.
//!
//! Read/write/delete degrade gracefully when Redis is down (a cache miss is
//! always a safe answer for the verify cache). The atomic `set_nx` guard is
//! the exception and surfaces connection failures to its caller.

use super::{error::CacheResult, RedisPool};
use async_trait::async_trait;
use bb8::PooledConnection;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

#[async_trait]
pub trait Cache<T: Serialize + DeserializeOwned + Send + Sync + 'static> {
    async fn get(&self, key: &str) -> CacheResult<Option<T>>;

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>;

    /// Set a value only if the key is absent, atomically, with a TTL.
    /// Returns whether this call created the key. Unlike the other
    /// operations this one does NOT degrade gracefully: callers use it as a
    /// cross-process guard and need to know when Redis is unreachable.
    async fn set_nx(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<bool>;

    async fn delete(&self, key: &str) -> CacheResult<bool>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;
}

pub struct RedisCache {
    pool: RedisPool,
}

impl RedisCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Checkout with the failure logged once; callers decide whether a dead
    /// connection is a miss or an error.
    async fn checkout(&self) -> CacheResult<RedisConnection<'_>> {
        self.pool.get().await.map_err(|e| {
            warn!("Redis checkout failed: {}", e);
            e.into()
        })
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> CacheResult<String> {
        serde_json::to_string(value).map_err(|e| {
            warn!("Could not serialize cache value for '{}': {}", key, e);
            e.into()
        })
    }
}

#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let Ok(mut conn) = self.checkout().await else {
            return Ok(None); // degrade to a miss
        };

        let raw: Option<String> = conn.get(key).await.map_err(|e| {
            warn!("Redis GET '{}' failed: {}", key, e);
            e
        })?;

        let Some(raw) = raw else {
            debug!(key, "cache miss");
            return Ok(None);
        };

        let value = serde_json::from_str(&raw).map_err(|e| {
            warn!("Stale or corrupt cache entry at '{}': {}", key, e);
            e
        })?;
        debug!(key, "cache hit");
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let Ok(mut conn) = self.checkout().await else {
            return Ok(()); // degrade to a no-op
        };
        let raw = Self::encode(key, value)?;

        let written: Result<(), _> = match ttl {
            Some(ttl) => conn.set_ex(key, raw, ttl.as_secs()).await,
            None => conn.set(key, raw).await,
        };
        written.map_err(|e| {
            warn!("Redis SET '{}' failed: {}", key, e);
            e
        })?;

        debug!(key, ?ttl, "cache write");
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.checkout().await?;
        let raw = Self::encode(key, value)?;

        // Single SET ... NX EX round trip so check and claim cannot interleave
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                warn!("Redis SET NX '{}' failed: {}", key, e);
                e
            })?;

        debug!(key, claimed = created.is_some(), "cache claim");
        Ok(created.is_some())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let Ok(mut conn) = self.checkout().await else {
            return Ok(false);
        };

        let removed: i32 = conn.del(key).await.map_err(|e| {
            warn!("Redis DEL '{}' failed: {}", key, e);
            e
        })?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let Ok(mut conn) = self.checkout().await else {
            return Ok(false);
        };

        let found: i32 = conn.exists(key).await.map_err(|e| {
            warn!("Redis EXISTS '{}' failed: {}", key, e);
            e
        })?;
        Ok(found > 0)
    }
}

/// TTLs per cached data class.
pub mod ttl {
    use std::time::Duration;

    /// Successful gateway verifications: 5 minutes
    pub const VERIFIED_TRANSACTIONS: Duration = Duration::from_secs(300);

    /// Processed webhook delivery marks: 24 hours
    pub const IDEMPOTENCY_MARKS: Duration = Duration::from_secs(86_400);
}
