use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use recommendflix_api::{
    config::{Config, StorageBackend},
    db::{create_pool, create_redis_client, run_migrations, Cache, MemoryStore, PgStore},
    engine::{Catalog, RatingStore, Recommender, RetrainScheduler},
    routes::{create_router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let (store, catalog): (Arc<dyn RatingStore>, Arc<dyn Catalog>) = match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.db_max_connections).await?;
            run_migrations(&pool).await?;
            let store = Arc::new(PgStore::new(pool));
            let catalog: Arc<dyn Catalog> = store.clone();
            (store as Arc<dyn RatingStore>, catalog)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on shutdown");
            let store = Arc::new(MemoryStore::new());
            let catalog: Arc<dyn Catalog> = store.clone();
            (store as Arc<dyn RatingStore>, catalog)
        }
    };

    let recommender = Arc::new(Recommender::new(store, config.engine()));

    // Serve empty results until a later rebuild succeeds
    if let Err(e) = recommender.retrain().await {
        tracing::warn!(error = %e, "Initial model build failed");
    }

    let (scheduler, scheduler_handle) =
        RetrainScheduler::spawn(recommender.clone(), config.scheduler());

    let (cache, cache_handle) = match config.redis_url.as_deref() {
        Some(url) => {
            let client = create_redis_client(url).context("Invalid REDIS_URL")?;
            let (cache, handle) = Cache::new(client).await;
            tracing::info!("Similar-item cache enabled");
            (Some(cache), Some(handle))
        }
        None => (None, None),
    };

    let state = Arc::new(AppState {
        recommender,
        catalog,
        scheduler,
        cache,
        cache_ttl: config.cache_ttl_secs,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        backend = ?config.storage_backend,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler_handle.shutdown().await;
    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
