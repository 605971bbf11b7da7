//! Prometheus plugin: feeds the prerender collectors from lifecycle hooks and
//! serves the exposition on the metrics path.
//!
//! # Hooks
//!
//! - `init` - resets the active-request gauge
//! - `process_request` - serves the metrics path, passes everything else on
//! - `request_received` - active requests +1
//! - `before_send` - active requests -1, then records the render result
//!
//! The gauge is decremented before anything is read from the render result,
//! so a missing or malformed result can never unbalance it.

use crate::collectors::PrerenderCollectors;
use crate::error::MetricsError;
use crate::handler::write_metrics;
use crate::plugin::{Next, Plugin, PrerenderRequest, PrerenderResponse, Proceed, ServerHandle};
use crate::registry::MetricRegistry;
use crate::render::{Phase, RenderResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Path served by [`PrometheusPlugin::process_request`] unless overridden.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

const MILLIS_PER_SECOND: f64 = 1000.0;

/// Lifecycle hook adapter translating render results into collector updates.
#[derive(Clone)]
pub struct PrometheusPlugin {
    registry: Arc<MetricRegistry>,
    collectors: PrerenderCollectors,
    metrics_path: String,
}

impl PrometheusPlugin {
    /// Create the plugin over a registry that has the prerender collectors
    /// registered (see [`PrerenderCollectors::register`]).
    pub fn new(registry: Arc<MetricRegistry>) -> Result<Self, MetricsError> {
        let collectors = PrerenderCollectors::from_registry(&registry)?;
        Ok(Self {
            registry,
            collectors,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        })
    }

    /// Serve the exposition on `path` instead of [`DEFAULT_METRICS_PATH`].
    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Record one finished render into the histogram, counter and summary.
    pub fn record_render(&self, result: &RenderResult) {
        let status_code = result.status_label();
        let render_type = result.render_type_label();
        let labels = [status_code.as_str(), render_type];

        let total_ms = result.total_ms();
        if total_ms > 0.0 {
            self.collectors
                .total_duration
                .observe(&labels, total_ms / MILLIS_PER_SECOND);
        }

        if let Some(len) = result.content_len() {
            self.collectors.rendered_bytes.inc(&labels, len as u64);
        }

        for phase in Phase::ALL {
            if let Some(ms) = result.positive_phase_ms(phase) {
                self.collectors.phase_seconds.observe(
                    &[phase.label(), status_code.as_str(), render_type],
                    ms / MILLIS_PER_SECOND,
                );
            }
        }

        debug!(
            target: "prerender.metrics",
            status_code = %status_code,
            render_type = %render_type,
            total_ms,
            "Render recorded"
        );
    }
}

impl Plugin for PrometheusPlugin {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn init(&self, server: &ServerHandle) {
        self.collectors.active_requests.set(0.0);
        info!(
            target: "prerender.metrics",
            bind_address = %server.bind_address(),
            metrics_path = %self.metrics_path,
            "Prometheus plugin initialized"
        );
    }

    fn process_request(&self, req: &PrerenderRequest, res: &mut PrerenderResponse) -> bool {
        if req.target() != self.metrics_path {
            return false;
        }
        write_metrics(&self.registry, res);
        true
    }

    fn request_received(
        &self,
        _req: &mut PrerenderRequest,
        _res: &mut PrerenderResponse,
        next: Next,
    ) -> Proceed {
        self.collectors.active_requests.inc();
        next.call()
    }

    fn before_send(
        &self,
        req: &mut PrerenderRequest,
        _res: &mut PrerenderResponse,
        next: Next,
    ) -> Proceed {
        self.collectors.active_requests.dec();
        if let Some(result) = &req.prerender {
            self.record_render(result);
        }
        next.call()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use crate::testing::sample_value;
    use axum::http::{header, Method, StatusCode, Uri};
    use bytes::Bytes;

    fn plugin() -> PrometheusPlugin {
        let registry = PrerenderCollectors::register(RegistryBuilder::new().process_metrics(false))
            .and_then(RegistryBuilder::build)
            .expect("registry should build");
        PrometheusPlugin::new(Arc::new(registry)).expect("plugin should build")
    }

    fn scrape(plugin: &PrometheusPlugin) -> String {
        plugin.registry().collect_all().unwrap()
    }

    fn request(path: &'static str) -> PrerenderRequest {
        PrerenderRequest::new(Method::GET, Uri::from_static(path))
    }

    fn run_request(plugin: &PrometheusPlugin, result: Option<RenderResult>) {
        let mut req = request("/https://example.com/");
        let mut res = PrerenderResponse::new();
        let _ = plugin.request_received(&mut req, &mut res, Next::new());
        req.prerender = result;
        let _ = plugin.before_send(&mut req, &mut res, Next::new());
    }

    fn ok_labels() -> [(&'static str, &'static str); 2] {
        [("status_code", "200"), ("render_type", "html")]
    }

    #[test]
    fn test_init_resets_active_requests() {
        let plugin = plugin();
        plugin.collectors.active_requests.set(7.0);

        plugin.init(&ServerHandle::new("127.0.0.1:3000"));

        assert_eq!(
            sample_value(&scrape(&plugin), "prerender_active_requests", &[]),
            Some(0.0)
        );
    }

    #[test]
    fn test_request_received_and_before_send_balance() {
        let plugin = plugin();
        let mut req = request("/https://example.com/");
        let mut res = PrerenderResponse::new();

        let _ = plugin.request_received(&mut req, &mut res, Next::new());
        assert_eq!(
            sample_value(&scrape(&plugin), "prerender_active_requests", &[]),
            Some(1.0)
        );

        let _ = plugin.before_send(&mut req, &mut res, Next::new());
        assert_eq!(
            sample_value(&scrape(&plugin), "prerender_active_requests", &[]),
            Some(0.0)
        );
    }

    #[test]
    fn test_before_send_without_result_only_touches_gauge() {
        let plugin = plugin();

        run_request(&plugin, None);

        let body = scrape(&plugin);
        assert_eq!(sample_value(&body, "prerender_active_requests", &[]), Some(0.0));
        assert!(!body.contains("prerender_requests_duration_seconds_count"));
        assert!(!body.contains("prerender_rendered_bytes_total{"));
        assert!(!body.contains("prerender_phase_seconds_count"));
    }

    #[test]
    fn test_phase_timings_feed_histogram_and_summary() {
        let plugin = plugin();
        let result = RenderResult {
            status_code: Some(200),
            time_spent_connecting_to_browser: Some(100.0),
            time_spent_opening_tab: Some(50.0),
            time_spent_loading_url: Some(200.0),
            time_spent_parsing_page: Some(150.0),
            ..Default::default()
        };

        run_request(&plugin, Some(result));

        let body = scrape(&plugin);
        assert_eq!(
            sample_value(&body, "prerender_requests_duration_seconds_sum", &ok_labels()),
            Some(0.5)
        );
        assert_eq!(
            sample_value(&body, "prerender_requests_duration_seconds_count", &ok_labels()),
            Some(1.0)
        );

        for (phase, seconds) in [
            ("timeSpentConnectingToBrowser", 0.1),
            ("timeSpentOpeningTab", 0.05),
            ("timeSpentLoadingUrl", 0.2),
            ("timeSpentParsingPage", 0.15),
        ] {
            let labels = [
                ("phase", phase),
                ("status_code", "200"),
                ("render_type", "html"),
            ];
            assert_eq!(
                sample_value(&body, "prerender_phase_seconds_count", &labels),
                Some(1.0),
                "phase {phase}"
            );
            assert_eq!(
                sample_value(&body, "prerender_phase_seconds_sum", &labels),
                Some(seconds),
                "phase {phase}"
            );
        }
        assert!(!body.contains("timeUntilError"));
    }

    #[test]
    fn test_error_wait_only_reaches_summary() {
        let plugin = plugin();
        let result = RenderResult {
            status_code: Some(504),
            time_until_error: Some(3000.0),
            ..Default::default()
        };

        run_request(&plugin, Some(result));

        let body = scrape(&plugin);
        assert!(!body.contains("prerender_requests_duration_seconds_count"));
        assert_eq!(
            sample_value(
                &body,
                "prerender_phase_seconds_sum",
                &[
                    ("phase", "timeUntilError"),
                    ("status_code", "504"),
                    ("render_type", "html")
                ]
            ),
            Some(3.0)
        );
    }

    #[test]
    fn test_zero_total_skips_histogram() {
        let plugin = plugin();
        let result = RenderResult {
            status_code: Some(200),
            time_spent_loading_url: Some(0.0),
            content: Some(Bytes::from_static(b"<html></html>")),
            ..Default::default()
        };

        run_request(&plugin, Some(result));

        let body = scrape(&plugin);
        assert!(!body.contains("prerender_requests_duration_seconds_count"));
        assert_eq!(
            sample_value(&body, "prerender_rendered_bytes_total", &ok_labels()),
            Some(13.0)
        );
    }

    #[test]
    fn test_rendered_bytes_accumulate() {
        let plugin = plugin();
        let content = Bytes::from(vec![b'x'; 1024]);

        for _ in 0..5 {
            run_request(
                &plugin,
                Some(RenderResult {
                    status_code: Some(200),
                    content: Some(content.clone()),
                    ..Default::default()
                }),
            );
        }

        assert_eq!(
            sample_value(&scrape(&plugin), "prerender_rendered_bytes_total", &ok_labels()),
            Some(5.0 * 1024.0)
        );
    }

    #[test]
    fn test_missing_status_and_type_use_fallback_labels() {
        let plugin = plugin();

        run_request(
            &plugin,
            Some(RenderResult {
                time_spent_loading_url: Some(20.0),
                ..Default::default()
            }),
        );

        let body = scrape(&plugin);
        assert_eq!(
            sample_value(
                &body,
                "prerender_requests_duration_seconds_count",
                &[("status_code", "unknown"), ("render_type", "html")]
            ),
            Some(1.0)
        );
    }

    #[test]
    fn test_process_request_serves_metrics_path_only() {
        let plugin = plugin();

        let mut res = PrerenderResponse::new();
        assert!(!plugin.process_request(&request("/https://example.com/"), &mut res));
        assert!(!res.is_ended());

        let mut res = PrerenderResponse::new();
        assert!(!plugin.process_request(&request("/metrics?x=1"), &mut res));

        let mut res = PrerenderResponse::new();
        assert!(plugin.process_request(&request("/metrics"), &mut res));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(
            res.headers.get(header::CONTENT_TYPE).unwrap(),
            crate::registry::CONTENT_TYPE
        );
        let body = std::str::from_utf8(res.body().unwrap()).unwrap();
        for name in [
            "prerender_active_requests",
            "prerender_requests_duration_seconds",
            "prerender_rendered_bytes_total",
            "prerender_phase_seconds",
        ] {
            assert!(body.contains(name), "missing {name} in:\n{body}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_leave_gauge_balanced() {
        let plugin = Arc::new(plugin());

        let tasks: Vec<_> = (0..64u32)
            .map(|i| {
                let plugin = Arc::clone(&plugin);
                tokio::spawn(async move {
                    let mut req = request("/https://example.com/");
                    let mut res = PrerenderResponse::new();
                    let _ = plugin.request_received(&mut req, &mut res, Next::new());
                    tokio::task::yield_now().await;
                    // Every third render fails before a result is attached.
                    if i % 3 != 0 {
                        req.prerender = Some(RenderResult {
                            status_code: Some(200),
                            time_spent_loading_url: Some(10.0),
                            ..Default::default()
                        });
                    }
                    let _ = plugin.before_send(&mut req, &mut res, Next::new());
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.expect("task should not panic");
        }

        let body = scrape(&plugin);
        assert_eq!(sample_value(&body, "prerender_active_requests", &[]), Some(0.0));
        assert_eq!(
            sample_value(&body, "prerender_requests_duration_seconds_count", &ok_labels()),
            Some(42.0)
        );
    }

    #[test]
    fn test_renders_survive_upkeep_between_scrapes() {
        let plugin = plugin();
        let result = RenderResult {
            status_code: Some(200),
            time_spent_connecting_to_browser: Some(100.0),
            time_spent_opening_tab: Some(50.0),
            time_spent_loading_url: Some(200.0),
            time_spent_parsing_page: Some(150.0),
            ..Default::default()
        };

        for _ in 0..1000 {
            plugin.record_render(&result);
        }
        plugin.registry().run_upkeep();
        plugin.record_render(&result);
        plugin.registry().run_upkeep();

        let body = scrape(&plugin);
        assert_eq!(
            sample_value(&body, "prerender_requests_duration_seconds_count", &ok_labels()),
            Some(1001.0)
        );
        assert_eq!(
            sample_value(
                &body,
                "prerender_requests_duration_seconds_bucket",
                &[("status_code", "200"), ("render_type", "html"), ("le", "0.5")]
            ),
            Some(1001.0)
        );
        assert_eq!(
            sample_value(
                &body,
                "prerender_phase_seconds_count",
                &[
                    ("phase", "timeSpentParsingPage"),
                    ("status_code", "200"),
                    ("render_type", "html")
                ]
            ),
            Some(1001.0)
        );
    }

    #[test]
    fn test_process_request_ignores_method() {
        let plugin = plugin().with_metrics_path("/internal/metrics");
        let req = PrerenderRequest::new(Method::POST, Uri::from_static("/internal/metrics"));
        let mut res = PrerenderResponse::new();

        assert!(plugin.process_request(&req, &mut res));
        assert!(res.is_ended());
    }
}
