//! Prerender request handler.
//!
//! Mounted as the router fallback, so every path and method other than
//! `/health` flows through the plugin chain:
//!
//! 1. `process_request` - a plugin may answer directly (the metrics path)
//! 2. `request_received`
//! 3. Parse the render target; an invalid target is a 400 with no result
//! 4. Render under the page-load timeout; failures become error results
//! 5. `before_send`, then the response built from the result

use crate::errors::ServiceError;
use crate::renderer::{RenderError, RenderJob, Renderer};
use crate::routes::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use prerender_metrics::plugin::response_for;
use prerender_metrics::{PrerenderRequest, PrerenderResponse, RenderResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[tracing::instrument(skip_all, name = "prerender.request", fields(method = %method, uri = %uri))]
pub async fn prerender_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let mut req = PrerenderRequest::new(method, uri);
    req.headers = headers;

    let mut res = PrerenderResponse::new();
    if state.chain.process_request(&req, &mut res) {
        return res.into_response();
    }

    let mut in_flight = state.chain.begin(req);

    let job = match RenderJob::from_uri(&in_flight.request().uri) {
        Ok(job) => job,
        Err(e) => {
            debug!(target: "prerender.service", error = %e, "Rejected render target");
            let _ = in_flight.finish(PrerenderResponse::new());
            return ServiceError::BadRequest(e.to_string()).into_response();
        }
    };

    let result = render_with_timeout(
        state.renderer.as_ref(),
        &job,
        state.config.page_load_timeout,
    )
    .await;
    let response = response_for(&result);
    in_flight.attach(result);
    in_flight.finish(response).into_response()
}

/// Render `job`, turning failures and timeouts into error results.
///
/// An error result carries the failure's status code, the requested render
/// type and the time waited before giving up in `time_until_error`.
pub async fn render_with_timeout(
    renderer: &dyn Renderer,
    job: &RenderJob,
    timeout: Duration,
) -> RenderResult {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, renderer.render(job)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(RenderError::Timeout(timeout)),
    };

    match outcome {
        Ok(result) => result,
        Err(e) => {
            let waited_ms = started.elapsed().as_secs_f64() * 1000.0;
            warn!(
                target: "prerender.service",
                error = %e,
                status_code = e.status_code(),
                render_type = %job.render_type,
                waited_ms,
                "Render failed"
            );
            RenderResult {
                status_code: Some(e.status_code()),
                render_type: Some(job.render_type.clone()),
                time_until_error: Some(waited_ms),
                ..Default::default()
            }
        }
    }
}
