//! Delivery idempotency guard.
//!
//! Processed-delivery marks live in Redis so every instance behind the load
//! balancer sees the same marks. The guard key hashes the event name, the
//! gateway's delivery id and the transaction reference; redeliveries of the
//! same delivery collapse onto one key while distinct deliveries for the same
//! reference stay distinct.
//!
//! The guard is an optimization, not the correctness boundary: the terminal
//! status check inside the dispatcher makes replays harmless even when a mark
//! is missing. Marks are written only after the settlement unit commits.

use crate::cache::error::CacheResult;
use crate::cache::{keys, Cache, RedisCache, RedisPool};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Builds the guard key for one delivery
pub fn delivery_key(event_name: &str, delivery_id: &str, reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_name.as_bytes());
    hasher.update([0x1f]);
    hasher.update(delivery_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(reference.as_bytes());
    keys::idempotency(&hex::encode(hasher.finalize()))
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn is_processed(&self, key: &str) -> CacheResult<bool>;

    /// Claims the key atomically with a TTL. Returns `false` when another
    /// process claimed it first.
    async fn mark_processed(&self, key: &str, ttl: Duration) -> CacheResult<bool>;
}

/// Shared-Redis guard used in production
pub struct RedisIdempotencyStore {
    cache: RedisCache,
}

impl RedisIdempotencyStore {
    pub fn new(pool: RedisPool) -> Self {
        Self {
            cache: RedisCache::new(pool),
        }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn is_processed(&self, key: &str) -> CacheResult<bool> {
        Cache::<i32>::exists(&self.cache, key).await
    }

    async fn mark_processed(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        Cache::<i32>::set_nx(&self.cache, key, &1, ttl).await
    }
}

/// In-process guard for tests and single-instance development setups. Marks
/// are lost on restart and invisible to other processes.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn is_processed(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok(entries.contains_key(key))
    }

    async fn mark_processed(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, expires_at| *expires_at > now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}
