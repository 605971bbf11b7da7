//! HTTP routes for the prerender service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::pipeline::PluginChain;
use crate::renderer::Renderer;
use axum::{routing::get, Router};
use prerender_metrics::{MetricRegistry, MetricsError, PrerenderCollectors, PrometheusPlugin};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Metric registry behind the metrics path.
    pub registry: Arc<MetricRegistry>,

    /// Plugins run for every request outside `/health`.
    pub chain: Arc<PluginChain>,

    /// Renderer invoked for render requests.
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    /// Build the registry, the Prometheus plugin and the plugin chain.
    ///
    /// The chain is not initialized; call `chain.init` once the listener is
    /// bound.
    pub fn new(config: Config, renderer: Arc<dyn Renderer>) -> Result<Self, MetricsError> {
        let registry = Arc::new(
            PrerenderCollectors::register(MetricRegistry::builder())?
                .process_metrics(config.process_metrics)
                .build()?,
        );

        let prometheus = PrometheusPlugin::new(Arc::clone(&registry))?
            .with_metrics_path(config.metrics_path.clone());
        let chain = Arc::new(PluginChain::new().with(Arc::new(prometheus)));

        Ok(Self {
            config,
            registry,
            chain,
            renderer,
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK"), bypasses the plugin chain
/// - fallback - Plugin chain: metrics path, then render requests
/// - TraceLayer for request logging
/// - Request timeout from configuration
pub fn build_routes(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    Router::new()
        .route("/health", get(handlers::health_check))
        .fallback(handlers::prerender_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}
