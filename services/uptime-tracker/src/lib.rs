//! Uptime Tracker - container liveness sampling and uptime history
//!
//! Polls the container runtime, records one observation point per tracked
//! workload, serves the cached status list with uptime percentages and prunes
//! old history.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod registry;
pub mod retention;
pub mod runtime;
pub mod stats;
pub mod store;

pub use config::{load_config, Config};
pub use error::{Result, UptimeError};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{AppState, STATUS_CACHE_KEY};
use crate::cache::TtlCache;
use crate::config::StoreConfig;
use crate::pipeline::Pipeline;
use crate::registry::Registry;
use crate::retention::RetentionManager;
use crate::runtime::{DockerSnapshotSource, SnapshotSource};
use crate::store::{JsonFileStore, MemoryStore, Store};

/// Open the configured history store
pub async fn open_store(config: &StoreConfig) -> Arc<dyn Store> {
    match config {
        StoreConfig::Memory => {
            tracing::info!("Using in-memory history store");
            Arc::new(MemoryStore::new())
        }
        StoreConfig::JsonFile { path } => {
            tracing::info!("Using JSON history store at {:?}", path);
            Arc::new(JsonFileStore::connect(path.clone()).await)
        }
    }
}

/// Wire the service components together from configuration
pub async fn build_state(config: &Config) -> Result<AppState> {
    let registry = Arc::new(Registry::new(config.workloads.clone()));
    let store = open_store(&config.store).await;
    if !store.healthy() {
        tracing::warn!("History store is unavailable, uptime statistics will read as zero");
    }

    let source: Arc<dyn SnapshotSource> =
        Arc::new(DockerSnapshotSource::from_config(&config.runtime)?);
    Ok(build_state_with(config, registry, source, store))
}

/// Same as [`build_state`] with the runtime source and store supplied
pub fn build_state_with(
    config: &Config,
    registry: Arc<Registry>,
    source: Arc<dyn SnapshotSource>,
    store: Arc<dyn Store>,
) -> AppState {
    let retention = Arc::new(RetentionManager::new(
        Arc::clone(&store),
        config.retention.max_age_days,
        config.polling.interval,
    ));
    let pipeline = Arc::new(
        Pipeline::new(registry, Arc::clone(&source), Arc::clone(&store))
            .with_retention(Arc::clone(&retention), config.retention.cleanup_every_days),
    );

    AppState {
        pipeline,
        cache: Arc::new(TtlCache::new()),
        cache_ttl: config.polling.cache_ttl,
        retention,
        source,
        store,
        api_key: config.server.api_key.clone(),
    }
}

/// Run the uptime tracker with the given configuration
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let state = build_state(&config).await?;
    let cancel = CancellationToken::new();

    tracing::info!(
        "Tracking {} workload(s), polling every {:?}",
        state.pipeline.registry().len(),
        config.polling.interval
    );

    // Warm the cache so the first request does not wait on the runtime
    if let Err(e) = state.current_status().await {
        tracing::warn!("Initial poll failed: {}", e);
    }

    let pipeline = Arc::clone(&state.pipeline);
    state.cache.start_interval(
        STATUS_CACHE_KEY,
        move || {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.run().await.map(Arc::new) }
        },
        config.polling.interval,
    );

    // Setup shutdown handler
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        cancel_for_signal.cancel();
    });

    let cache = Arc::clone(&state.cache);

    if config.server.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("API listening on http://{}", addr);

        let router = api::build_router(state);
        let cancel_for_server = cancel.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_for_server.cancelled().await;
            })
            .await?;
        tracing::debug!("API server stopped");
    } else {
        tracing::info!("API server disabled, polling only");
        cancel.cancelled().await;
    }

    cache.stop_interval(STATUS_CACHE_KEY);
    tracing::info!("Uptime tracker stopped");

    Ok(())
}
