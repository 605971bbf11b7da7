//! Prerender metrics pipeline.
//!
//! Instruments the request pipeline of a headless prerender server with four
//! Prometheus collectors fed by per-request lifecycle hooks, and serves them
//! from a pull-based metrics endpoint.
//!
//! # Architecture
//!
//! ```text
//! registry.rs  -> collectors.rs -> prometheus.rs (hooks) -> handler.rs (endpoint)
//!                                      ^
//!                                  plugin.rs (hook contract), render.rs (render result)
//! ```
//!
//! # Modules
//!
//! - `registry` - Process-wide metric registry and text exposition
//! - `collectors` - Typed gauge/counter/histogram/summary handles
//! - `process` - Best-effort process and runtime stats
//! - `render` - Render result attached to a request by the renderer
//! - `plugin` - Lifecycle hook contract used by the middleware chain
//! - `prometheus` - The metrics plugin implementing the four hooks
//! - `handler` - Metrics endpoint response building and axum handler
//! - `error` - Error types

pub mod collectors;
pub mod error;
pub mod handler;
pub mod plugin;
pub mod process;
pub mod prometheus;
pub mod registry;
pub mod render;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use collectors::{Counter, Gauge, Histogram, PrerenderCollectors, Summary};
pub use error::MetricsError;
pub use plugin::{Next, Plugin, PrerenderRequest, PrerenderResponse, Proceed, ServerHandle};
pub use prometheus::{PrometheusPlugin, DEFAULT_METRICS_PATH};
pub use registry::{MetricDescriptor, MetricKind, MetricRegistry, RegistryBuilder, UPKEEP_INTERVAL};
pub use render::{Phase, RenderResult};
