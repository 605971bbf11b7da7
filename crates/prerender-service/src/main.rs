//! Prerender Service
//!
//! Entry point for the prerender server. Renders pages for crawlers and
//! exposes Prometheus metrics about the render pipeline.

use prerender_metrics::{ServerHandle, UPKEEP_INTERVAL};
use prerender_service::config::Config;
use prerender_service::renderer::HttpRenderer;
use prerender_service::routes::{self, AppState};
use prerender_service::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "prerender_service=info,prerender_metrics=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Prerender Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        metrics_path = %config.metrics_path,
        page_load_timeout_ms = config.page_load_timeout.as_millis() as u64,
        process_metrics = config.process_metrics,
        "Configuration loaded successfully"
    );

    let renderer = HttpRenderer::new(config.page_load_timeout).map_err(|e| {
        error!("Failed to create renderer: {}", e);
        e
    })?;

    let drain = Duration::from_secs(config.drain_seconds);
    let bind_address = config.bind_address.clone();

    // Registry, plugin chain and renderer
    let state = AppState::new(config, Arc::new(renderer)).map_err(|e| {
        error!("Failed to build metrics registry: {}", e);
        e
    })?;
    let state = Arc::new(state);
    let upkeep = state.registry.spawn_upkeep(UPKEEP_INTERVAL);

    // Parse bind address
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    state.chain.init(&ServerHandle::new(local_addr.to_string()));

    let app = routes::build_routes(state);

    info!("Prerender Service listening on {}", local_addr);

    // Start server with graceful shutdown support
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain))
        .await?;

    upkeep.abort();
    info!("Prerender Service shutdown complete");

    Ok(())
}
