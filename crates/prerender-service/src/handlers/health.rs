//! Health check handler.
//!
//! `/health` is routed ahead of the plugin chain, so probes are never counted
//! as prerender requests.

/// Liveness probe handler.
///
/// Returns "OK" while the process is serving. Does not check the renderer.
pub async fn health_check() -> &'static str {
    "OK"
}
