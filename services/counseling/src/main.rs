use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod codes;
mod error;
mod extract;
mod mappings;
mod middleware;
mod models;
mod repositories;
mod routes;
mod settings;
mod state;
mod validation;
mod workflow;

use common::{
    cache::{CacheBackend, MemoryCache, RedisConfig, RedisPool, TtlCache},
    clock::{Clock, SystemClock},
    database::{DatabaseConfig, init_pool},
};

use crate::{
    codes::CodeService,
    mappings::MappingService,
    repositories::{MemoryStore, PgStore, Store, postgres::run_migrations},
    settings::{AppConfig, StorageBackend},
    state::AppState,
    workflow::ExtensionWorkflow,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting counseling service");

    let config = AppConfig::load()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn Store> = match config.storage.backend {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from(&config.database);
            let pool = init_pool(&db_config).await?;

            // Check database connectivity
            if common::database::health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let cache_backend: Arc<dyn CacheBackend> = match &config.cache.redis_url {
        Some(url) => {
            let redis = RedisPool::new(&RedisConfig { url: url.clone() })?;
            if redis.health_check().await? {
                info!("Redis connection successful");
            }
            Arc::new(redis)
        }
        None => Arc::new(MemoryCache::new(clock.clone())),
    };
    let cache = TtlCache::new("common-codes", cache_backend, clock.clone());

    let app_state = AppState {
        store: store.clone(),
        workflow: ExtensionWorkflow::new(store.clone(), clock.clone()),
        mappings: MappingService::new(store.clone(), clock),
        codes: CodeService::new(store, cache, config.cache.code_ttl()),
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!("Counseling service listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Counseling service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
