//! Integration tests for the infrastructure components
//!
//! The shared-backend test runs everywhere. The PostgreSQL and Redis tests
//! need live servers (`DATABASE_URL`, `REDIS_URL`) and are ignored by default;
//! run them with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use common::{
    cache::{CacheBackend, MemoryCache, RedisConfig, RedisPool, TtlCache},
    clock::{Clock, SystemClock},
    database::{DatabaseConfig, health_check, init_pool},
};
use sqlx::Row;

/// Two service instances sharing one backend see each other's invalidations
#[tokio::test]
async fn test_invalidation_is_shared_through_backend() -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new(clock.clone()));

    let node_a = TtlCache::new("common_codes", backend.clone(), clock.clone());
    let node_b = TtlCache::new("common_codes", backend, clock);
    let ttl = Duration::from_secs(300);

    node_a.put("PAYMENT_METHOD", &vec!["CASH", "CARD"], ttl).await?;
    let seen: Option<Vec<String>> = node_b.get("PAYMENT_METHOD", ttl).await?;
    assert_eq!(seen, Some(vec!["CASH".to_string(), "CARD".to_string()]));

    node_b.invalidate_all().await?;
    let after: Option<Vec<String>> = node_a.get("PAYMENT_METHOD", ttl).await?;
    assert_eq!(after, None);

    Ok(())
}

/// Test that verifies both PostgreSQL and Redis are accessible
/// and can perform basic operations
#[tokio::test]
#[ignore = "requires running PostgreSQL and Redis servers"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_pool = RedisPool::new(&RedisConfig::from_env())?;
    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = TtlCache::new("integration_test", Arc::new(redis_pool), clock);
    let ttl = Duration::from_secs(10);

    cache.put("key", &"integration_test_value", ttl).await?;
    let retrieved: Option<String> = cache.get("key", ttl).await?;
    assert_eq!(
        retrieved,
        Some("integration_test_value".to_string()),
        "Redis SET/GET test failed"
    );

    cache.invalidate("key").await?;
    let retrieved: Option<String> = cache.get("key", ttl).await?;
    assert_eq!(retrieved, None, "Redis delete operation failed");

    Ok(())
}
