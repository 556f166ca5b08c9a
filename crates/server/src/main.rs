//! Chantilly server - online model serving over HTTP
//!
//! Loads configuration, opens the storage backend, and serves the API until
//! interrupted.

use anyhow::{Context, Result};
use chantilly_server::{api, AppState, ServerConfig};
use server_lib::{
    health::{components, HealthRegistry},
    service::VERSION,
    storage, Db, Service,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting chantilly-server");

    let config = ServerConfig::load()?;
    let settings = config.storage_settings()?;
    info!(backend = settings.name(), "Opening storage");

    let backend = storage::open(&settings)
        .with_context(|| format!("Failed to open {} storage", settings.name()))?;
    let health = HealthRegistry::new();
    health.register(components::STORAGE).await;
    health.register(components::ANNOUNCER).await;

    let service = Service::new(Db::new(backend), settings.name(), config.stream_capacity)
        .with_health(health.clone());

    let logger = service.logger().clone();
    let addr = config.addr();
    logger.log_startup(VERSION, settings.name(), &addr);

    let state = Arc::new(AppState::new(service.clone(), health.clone()));
    health.set_ready(true).await;

    // Open event streams never end on their own, so close them before
    // graceful shutdown waits on connections
    let streams = service.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        streams.close_streams();
    };
    api::serve(&addr, state, shutdown).await?;

    logger.log_shutdown("SIGINT received");
    health.set_ready(false).await;
    service.close().await.context("Failed to close storage")?;

    Ok(())
}
