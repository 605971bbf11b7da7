//! Metrics endpoint.
//!
//! Serves the registry's exposition either through the plugin chain
//! ([`write_metrics`], used by `PrometheusPlugin::process_request`) or as a
//! plain axum handler for routers that mount the path themselves.
//!
//! # Security
//!
//! The endpoint is unauthenticated so Prometheus can scrape it. Labels carry
//! status codes, render types and phase names only; no URLs or content.

use crate::error::MetricsError;
use crate::plugin::PrerenderResponse;
use crate::registry::MetricRegistry;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::error;

/// Write the current exposition into `res`.
pub fn write_metrics(registry: &MetricRegistry, res: &mut PrerenderResponse) {
    write_exposition(registry.collect_all(), registry.content_type(), res);
}

/// Write a rendered exposition, or a 500 with a generic body when rendering
/// failed. The cause is logged server-side.
fn write_exposition(
    rendered: Result<String, MetricsError>,
    content_type: &'static str,
    res: &mut PrerenderResponse,
) {
    match rendered {
        Ok(body) => {
            res.status = StatusCode::OK;
            res.set_header(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            res.end(body);
        }
        Err(e) => {
            error!(target: "prerender.metrics", error = %e, "Failed to render metrics");
            res.status = StatusCode::INTERNAL_SERVER_ERROR;
            res.set_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            res.end("Failed to render metrics");
        }
    }
}

/// Handler for the metrics path when mounted directly on a router.
///
/// # Response
///
/// Returns 200 OK with Prometheus text format:
/// ```text
/// # HELP prerender_active_requests Number of active prerender requests
/// # TYPE prerender_active_requests gauge
/// prerender_active_requests 3
/// ```
#[tracing::instrument(skip_all, name = "prerender.metrics.scrape")]
pub async fn metrics_handler(State(registry): State<Arc<MetricRegistry>>) -> Response {
    let mut res = PrerenderResponse::new();
    write_metrics(&registry, &mut res);
    res.into_response()
}
