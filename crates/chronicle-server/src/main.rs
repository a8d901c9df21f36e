//! chronicle-server - Chronicle backend service
//!
//! Owns the chat ingestion boundary, the operator signal boundary, the
//! responder context boundary, and the background consolidation scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chronicle_core::engine::{GeminiConfig, GeminiEngine, Summarizer};
use chronicle_core::store::{RestControlChannel, RestStore, RestStoreConfig};
use chronicle_core::{ChatBuffer, Consolidator, ControlChannel, TierStore};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod jobs;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("chronicle_server=info".parse()?)
                .add_directive("chronicle_core=info".parse()?),
        )
        .init();

    info!("chronicle-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    config.validate()?;

    let timeout = Duration::from_secs(config.memory.engine_timeout_secs);
    let store_config = RestStoreConfig {
        base_url: config.store.url.clone(),
        api_key: config.store.api_key.clone(),
        timeout,
    };

    let store: Arc<dyn TierStore> = Arc::new(RestStore::new(store_config.clone())?);
    let signals: Arc<dyn ControlChannel> = Arc::new(RestControlChannel::new(store_config)?);
    let engine: Arc<dyn Summarizer> = Arc::new(
        GeminiEngine::new(GeminiConfig::new(
            config.engine.api_key.clone(),
            config.engine.model.clone(),
            timeout,
        ))
        .map_err(chronicle_core::Error::Engine)?,
    );

    let buffer = Arc::new(ChatBuffer::new());
    let consolidator = Arc::new(Consolidator::new(
        Arc::clone(&store),
        engine,
        config.memory.clone(),
    )?);

    // Background scheduler
    let scheduler = jobs::build_scheduler(
        consolidator,
        Arc::clone(&buffer),
        Arc::clone(&signals),
        &config.memory,
        &config.schedule,
    )?;
    let scheduler_task = tokio::spawn(scheduler.run());

    // HTTP surface
    let bind = config.bind.clone();
    let app_state = Arc::new(AppState {
        config: Arc::new(config),
        buffer,
        store,
        signals,
        start_time: Instant::now(),
    });
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    scheduler_task.abort();

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
