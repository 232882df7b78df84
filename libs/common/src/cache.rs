//! Cache module for the counseling backend
//!
//! This module provides a TTL cache service (`TtlCache`) layered over a
//! pluggable key/value backend. Two backends exist: an in-process map used by
//! default and in tests, and Redis for deployments where several instances
//! must see the same entries and the same invalidations.
//!
//! Freshness is decided at read time: `get(key, ttl)` compares the age of the
//! stored entry against `ttl` using the injected [`Clock`], so tests can move
//! time instead of sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::CacheResult;

/// Raw string key/value storage used by [`TtlCache`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value, optionally letting the backend evict it after `ttl_seconds`
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()>;

    /// Delete a key
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically increment an integer counter, creating it at 0 first
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> CacheResult<bool>;
}

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Self {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        RedisConfig { url }
    }
}

/// Redis-backed cache storage
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis client
    pub fn new(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

#[async_trait]
impl CacheBackend for RedisPool {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.get_connection().await?;
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process cache storage
#[derive(Debug, Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored keys, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now();

        let expired = match entries.get(key) {
            Some(entry) => entry.expires_at.is_some_and(|at| now >= at),
            None => return Ok(None),
        };

        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let now = self.clock.now();
        let expires_at = ttl_seconds.map(|ttl| now + chrono::Duration::seconds(ttl as i64));

        let mut entries = self.entries.lock().await;

        // Keys orphaned by a generation bump are never read again.
        entries.retain(|_, entry| entry.expires_at.is_none_or(|at| now < at));

        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(MemoryEntry {
            value: "0".to_string(),
            expires_at: None,
        });
        let next = entry.value.parse::<i64>().unwrap_or(0) + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredEntry<V> {
    stored_at_ms: i64,
    value: V,
}

/// TTL cache service
///
/// Keys are namespaced and carry a generation number. `invalidate_all` bumps
/// the generation held in the backend, which orphans every older entry at
/// once; orphans then age out through the backend expiry hint given to `put`.
#[derive(Clone)]
pub struct TtlCache {
    namespace: String,
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    /// Create a cache service over `backend`
    pub fn new(
        namespace: impl Into<String>,
        backend: Arc<dyn CacheBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
            clock,
        }
    }

    fn generation_key(&self) -> String {
        format!("{}:generation", self.namespace)
    }

    async fn entry_key(&self, key: &str) -> CacheResult<String> {
        let generation = self
            .backend
            .get(&self.generation_key())
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);

        Ok(format!("{}:{}:{}", self.namespace, generation, key))
    }

    /// Get a value if it was stored less than `ttl` ago
    pub async fn get<V: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
    ) -> CacheResult<Option<V>> {
        let entry_key = self.entry_key(key).await?;

        let Some(raw) = self.backend.get(&entry_key).await? else {
            debug!("Cache miss for {}", entry_key);
            return Ok(None);
        };

        let stored: StoredEntry<V> = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Dropping undecodable cache entry {}: {}", entry_key, e);
                self.backend.delete(&entry_key).await?;
                return Ok(None);
            }
        };

        let age_ms = self.clock.now().timestamp_millis() - stored.stored_at_ms;
        if age_ms < 0 || age_ms as u128 >= ttl.as_millis() {
            debug!("Cache entry {} is stale ({} ms old)", entry_key, age_ms);
            self.backend.delete(&entry_key).await?;
            return Ok(None);
        }

        Ok(Some(stored.value))
    }

    /// Store a value; `ttl` is passed to the backend as an eviction hint
    pub async fn put<V: Serialize>(&self, key: &str, value: &V, ttl: Duration) -> CacheResult<()> {
        let entry_key = self.entry_key(key).await?;
        let stored = StoredEntry {
            stored_at_ms: self.clock.now().timestamp_millis(),
            value,
        };
        let raw = serde_json::to_string(&stored)?;

        self.backend
            .set(&entry_key, &raw, Some(ttl.as_secs().max(1)))
            .await
    }

    /// Drop a single key
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let entry_key = self.entry_key(key).await?;
        self.backend.delete(&entry_key).await
    }

    /// Drop every key of this namespace
    pub async fn invalidate_all(&self) -> CacheResult<()> {
        let generation = self.backend.incr(&self.generation_key()).await?;
        info!(
            "Cache namespace {} invalidated, now at generation {}",
            self.namespace, generation
        );
        Ok(())
    }

    /// Check if the backend is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn cache_with_clock() -> (TtlCache, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let backend = Arc::new(MemoryCache::new(shared.clone()));
        (TtlCache::new("codes", backend, shared), clock)
    }

    #[tokio::test]
    async fn test_get_returns_fresh_entry() -> CacheResult<()> {
        let (cache, _clock) = cache_with_clock();

        cache
            .put("MAPPING_STATUS", &vec!["ACTIVE".to_string()], Duration::from_secs(300))
            .await?;

        let value: Option<Vec<String>> =
            cache.get("MAPPING_STATUS", Duration::from_secs(300)).await?;
        assert_eq!(value, Some(vec!["ACTIVE".to_string()]));
        Ok(())
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() -> CacheResult<()> {
        let (cache, clock) = cache_with_clock();
        let ttl = Duration::from_secs(300);

        cache.put("group", &42u32, ttl).await?;

        clock.advance(chrono::Duration::seconds(299));
        assert_eq!(cache.get::<u32>("group", ttl).await?, Some(42));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get::<u32>("group", ttl).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_ttl_is_decided_by_reader() -> CacheResult<()> {
        let (cache, clock) = cache_with_clock();

        cache.put("group", &"value", Duration::from_secs(300)).await?;
        clock.advance(chrono::Duration::seconds(60));

        assert_eq!(cache.get::<String>("group", Duration::from_secs(30)).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalidate_single_key() -> CacheResult<()> {
        let (cache, _clock) = cache_with_clock();
        let ttl = Duration::from_secs(300);

        cache.put("a", &1u8, ttl).await?;
        cache.put("b", &2u8, ttl).await?;
        cache.invalidate("a").await?;

        assert_eq!(cache.get::<u8>("a", ttl).await?, None);
        assert_eq!(cache.get::<u8>("b", ttl).await?, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalidate_all_orphans_every_key() -> CacheResult<()> {
        let (cache, _clock) = cache_with_clock();
        let ttl = Duration::from_secs(300);

        cache.put("a", &1u8, ttl).await?;
        cache.put("b", &2u8, ttl).await?;
        cache.invalidate_all().await?;

        assert_eq!(cache.get::<u8>("a", ttl).await?, None);
        assert_eq!(cache.get::<u8>("b", ttl).await?, None);

        cache.put("a", &3u8, ttl).await?;
        assert_eq!(cache.get::<u8>("a", ttl).await?, Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_backend_honours_expiry_hint() -> CacheResult<()> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap());
        let backend = MemoryCache::new(Arc::new(clock.clone()));

        backend.set("key", "value", Some(10)).await?;
        assert_eq!(backend.get("key").await?, Some("value".to_string()));

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(backend.get("key").await?, None);
        assert!(backend.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_orphaned_generations_are_swept() -> CacheResult<()> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let backend = MemoryCache::new(shared.clone());
        let cache = TtlCache::new("codes", Arc::new(backend.clone()), shared);
        let ttl = Duration::from_secs(300);

        cache.put("a", &1u8, ttl).await?;
        cache.put("b", &2u8, ttl).await?;
        cache.invalidate_all().await?;
        assert_eq!(backend.len().await, 3);

        clock.advance(chrono::Duration::seconds(300));
        cache.put("c", &3u8, ttl).await?;

        // generation counter and the fresh entry
        assert_eq!(backend.len().await, 2);
        assert_eq!(cache.get::<u8>("c", ttl).await?, Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_backend_incr() -> CacheResult<()> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap());
        let backend = MemoryCache::new(Arc::new(clock));

        assert_eq!(backend.incr("counter").await?, 1);
        assert_eq!(backend.incr("counter").await?, 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_set_get_delete() -> CacheResult<()> {
        let pool = RedisPool::new(&RedisConfig::from_env())?;
        assert!(pool.health_check().await?);

        let key = "test_key";
        pool.set(key, "test_value", Some(5)).await?;
        assert_eq!(pool.get(key).await?, Some("test_value".to_string()));

        pool.delete(key).await?;
        assert_eq!(pool.get(key).await?, None);
        Ok(())
    }
}
