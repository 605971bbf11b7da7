//! Process-wide metric registry.
//!
//! The registry is built once by the composition root and shared as an
//! `Arc<MetricRegistry>`. Every collector is declared through a
//! [`MetricDescriptor`] at construction time; there is no removal.
//!
//! Storage and text rendering are delegated to `metrics-exporter-prometheus`.
//! The recorder is built without being installed as the global `metrics`
//! recorder, so several registries can coexist (tests) and nothing here
//! depends on global state.
//!
//! # Exposition
//!
//! [`MetricRegistry::collect_all`] renders the exporter's output and then:
//! - drops quantile samples of summaries (sum/count only)
//! - appends `# HELP`/`# TYPE` lines for families with no samples yet
//! - refreshes process/runtime gauges first when enabled
//!
//! # Upkeep
//!
//! Histogram and summary observations are buffered by the exporter until
//! they are folded into their series. An installed exporter does this on a
//! background thread; this one does not, so the owner must call
//! [`MetricRegistry::run_upkeep`] periodically, usually through
//! [`MetricRegistry::spawn_upkeep`].

use crate::collectors::{metadata, Counter, Gauge, Histogram, Summary};
use crate::error::MetricsError;
use crate::process::{ProcessCollector, PROCESS_DESCRIPTORS};
use metrics::{Key, Recorder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::collections::HashSet;
use std::fmt::{self, Write};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default period between two upkeep passes.
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Media type of the Prometheus text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Kind of a registered collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
    Summary,
}

impl MetricKind {
    /// Name used in `# TYPE` lines.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static declaration of a collector: name, help text, kind and label schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub label_names: &'static [&'static str],
    /// Upper bounds for histogram buckets. Empty for other kinds.
    pub buckets: &'static [f64],
}

impl MetricDescriptor {
    pub const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            label_names: &[],
            buckets: &[],
        }
    }

    pub const fn counter(
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Counter,
            label_names,
            buckets: &[],
        }
    }

    pub const fn histogram(
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
        buckets: &'static [f64],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Histogram,
            label_names,
            buckets,
        }
    }

    /// A summary without quantiles: only `_sum` and `_count` are exposed.
    pub const fn summary(
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Summary,
            label_names,
            buckets: &[],
        }
    }
}

/// Collects descriptors before the registry is built.
///
/// Histogram buckets must be known when the exporter is built, which is why
/// registration happens here rather than on a live registry.
#[derive(Debug)]
pub struct RegistryBuilder {
    descriptors: Vec<MetricDescriptor>,
    process_metrics: bool,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            process_metrics: true,
        }
    }

    /// Register a collector. Each name may be registered exactly once.
    pub fn register(mut self, descriptor: MetricDescriptor) -> Result<Self, MetricsError> {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(MetricsError::DuplicateMetric(descriptor.name.to_string()));
        }
        self.descriptors.push(descriptor);
        Ok(self)
    }

    /// Include process and runtime gauges in the exposition (default: on).
    pub fn process_metrics(mut self, enabled: bool) -> Self {
        self.process_metrics = enabled;
        self
    }

    /// Build the exporter, describe every collector and create the registry.
    pub fn build(mut self) -> Result<MetricRegistry, MetricsError> {
        if self.process_metrics {
            for descriptor in PROCESS_DESCRIPTORS {
                self = self.register(descriptor)?;
            }
        }

        let mut builder = PrometheusBuilder::new();
        for descriptor in self
            .descriptors
            .iter()
            .filter(|d| d.kind == MetricKind::Histogram)
        {
            builder = builder
                .set_buckets_for_metric(
                    Matcher::Full(descriptor.name.to_string()),
                    descriptor.buckets,
                )
                .map_err(|e| {
                    MetricsError::Exporter(format!(
                        "invalid buckets for {}: {e}",
                        descriptor.name
                    ))
                })?;
        }

        let recorder = builder.build_recorder();
        for descriptor in &self.descriptors {
            describe(&recorder, descriptor);
        }

        // Unlabeled gauges and counters are created eagerly so they are
        // exposed with a zero value before the first update.
        for descriptor in self.descriptors.iter().filter(|d| d.label_names.is_empty()) {
            let key = Key::from_static_name(descriptor.name);
            match descriptor.kind {
                MetricKind::Gauge => {
                    recorder.register_gauge(&key, &metadata()).set(0.0);
                }
                MetricKind::Counter => {
                    recorder.register_counter(&key, &metadata()).absolute(0);
                }
                MetricKind::Histogram | MetricKind::Summary => {}
            }
        }

        let handle = recorder.handle();
        let process = self.process_metrics.then(ProcessCollector::new);

        tracing::debug!(
            target: "prerender.metrics",
            collectors = self.descriptors.len(),
            process_metrics = self.process_metrics,
            "Metric registry built"
        );

        Ok(MetricRegistry {
            recorder: Arc::new(recorder),
            handle,
            descriptors: self.descriptors,
            process,
        })
    }
}

fn describe(recorder: &PrometheusRecorder, descriptor: &MetricDescriptor) {
    let name = descriptor.name.into();
    let help = descriptor.help.into();
    match descriptor.kind {
        MetricKind::Gauge => recorder.describe_gauge(name, None, help),
        MetricKind::Counter => recorder.describe_counter(name, None, help),
        MetricKind::Histogram | MetricKind::Summary => {
            recorder.describe_histogram(name, None, help);
        }
    }
}

/// Registry of every collector in the process.
pub struct MetricRegistry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    descriptors: Vec<MetricDescriptor>,
    process: Option<ProcessCollector>,
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("descriptors", &self.descriptors)
            .field("process_metrics", &self.process.is_some())
            .finish()
    }
}

impl MetricRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Media type for the exposition body.
    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Every registered descriptor, in registration order.
    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    pub fn gauge(&self, name: &str) -> Result<Gauge, MetricsError> {
        let descriptor = self.lookup(name, MetricKind::Gauge)?;
        Ok(Gauge::new(Arc::clone(&self.recorder), descriptor))
    }

    pub fn counter(&self, name: &str) -> Result<Counter, MetricsError> {
        let descriptor = self.lookup(name, MetricKind::Counter)?;
        Ok(Counter::new(Arc::clone(&self.recorder), descriptor))
    }

    pub fn histogram(&self, name: &str) -> Result<Histogram, MetricsError> {
        let descriptor = self.lookup(name, MetricKind::Histogram)?;
        Ok(Histogram::new(Arc::clone(&self.recorder), descriptor))
    }

    pub fn summary(&self, name: &str) -> Result<Summary, MetricsError> {
        let descriptor = self.lookup(name, MetricKind::Summary)?;
        Ok(Summary::new(Arc::clone(&self.recorder), descriptor))
    }

    fn lookup(&self, name: &str, expected: MetricKind) -> Result<MetricDescriptor, MetricsError> {
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| MetricsError::UnknownMetric(name.to_string()))?;

        if descriptor.kind != expected {
            return Err(MetricsError::KindMismatch {
                name: name.to_string(),
                expected,
                actual: descriptor.kind,
            });
        }

        Ok(*descriptor)
    }

    /// Render the full text exposition.
    ///
    /// Safe to call while other threads update collectors; each series is
    /// read from a consistent snapshot.
    pub fn collect_all(&self) -> Result<String, MetricsError> {
        if let Some(process) = &self.process {
            process.refresh(&self.recorder);
        }

        let rendered = self.handle.render();

        let summaries: Vec<&str> = self
            .descriptors
            .iter()
            .filter(|d| d.kind == MetricKind::Summary)
            .map(|d| d.name)
            .collect();

        let mut typed: HashSet<&str> = HashSet::new();
        let mut out = String::with_capacity(rendered.len());

        for line in rendered.lines() {
            if let Some(name) = line
                .strip_prefix("# TYPE ")
                .and_then(|rest| rest.split(' ').next())
            {
                typed.insert(name);
            }
            if summaries.iter().any(|name| is_quantile_sample(line, name)) {
                continue;
            }
            writeln!(out, "{line}")?;
        }

        for descriptor in &self.descriptors {
            if typed.contains(descriptor.name) {
                continue;
            }
            writeln!(out, "# HELP {} {}", descriptor.name, descriptor.help)?;
            writeln!(out, "# TYPE {} {}", descriptor.name, descriptor.kind)?;
            writeln!(out)?;
        }

        Ok(out)
    }

    /// Fold buffered histogram and summary samples into their series.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Run [`MetricRegistry::run_upkeep`] every `period` on the current
    /// runtime. The task ends once the registry is dropped.
    pub fn spawn_upkeep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.run_upkeep();
            }
            tracing::debug!(target: "prerender.metrics", "Registry dropped, upkeep stopped");
        })
    }
}

fn is_quantile_sample(line: &str, summary: &str) -> bool {
    line.strip_prefix(summary)
        .is_some_and(|rest| rest.starts_with('{') && rest.contains("quantile=\""))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::sample_value;

    const REQUESTS: MetricDescriptor = MetricDescriptor::gauge("test_requests", "Test requests");
    const BYTES: MetricDescriptor =
        MetricDescriptor::counter("test_bytes_total", "Test bytes", &["kind"]);
    const LATENCY: MetricDescriptor = MetricDescriptor::histogram(
        "test_latency_seconds",
        "Test latency",
        &["kind"],
        &[0.1, 1.0],
    );
    const PHASES: MetricDescriptor =
        MetricDescriptor::summary("test_phase_seconds", "Test phases", &["phase"]);

    fn registry() -> MetricRegistry {
        RegistryBuilder::new()
            .process_metrics(false)
            .register(REQUESTS)
            .and_then(|b| b.register(BYTES))
            .and_then(|b| b.register(LATENCY))
            .and_then(|b| b.register(PHASES))
            .and_then(RegistryBuilder::build)
            .expect("registry should build")
    }

    #[test]
    fn test_register_rejects_duplicate_name() {
        let result = RegistryBuilder::new()
            .register(REQUESTS)
            .and_then(|b| b.register(REQUESTS));

        assert!(matches!(result, Err(MetricsError::DuplicateMetric(n)) if n == "test_requests"));
    }

    #[test]
    fn test_empty_buckets_fail_build() {
        const BAD: MetricDescriptor =
            MetricDescriptor::histogram("test_bad_seconds", "Bad", &[], &[]);

        let result = RegistryBuilder::new()
            .process_metrics(false)
            .register(BAD)
            .and_then(RegistryBuilder::build);

        assert!(matches!(result, Err(MetricsError::Exporter(_))));
    }

    #[test]
    fn test_lookup_checks_kind() {
        let registry = registry();

        assert!(registry.gauge("test_requests").is_ok());
        assert!(matches!(
            registry.counter("test_requests"),
            Err(MetricsError::KindMismatch {
                expected: MetricKind::Counter,
                actual: MetricKind::Gauge,
                ..
            })
        ));
        assert!(matches!(
            registry.summary("missing"),
            Err(MetricsError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_collect_all_lists_families_without_samples() {
        let body = registry().collect_all().unwrap();

        for name in [
            "test_requests",
            "test_bytes_total",
            "test_latency_seconds",
            "test_phase_seconds",
        ] {
            assert!(body.contains(&format!("# HELP {name} ")), "missing HELP for {name}");
            assert!(body.contains(&format!("# TYPE {name} ")), "missing TYPE for {name}");
        }
        assert_eq!(sample_value(&body, "test_requests", &[]), Some(0.0));
    }

    #[test]
    fn test_collect_all_drops_summary_quantiles() {
        let registry = registry();
        let phases = registry.summary("test_phase_seconds").unwrap();
        phases.observe(&["load"], 0.25);
        phases.observe(&["load"], 0.75);

        let body = registry.collect_all().unwrap();

        assert!(body.contains("# TYPE test_phase_seconds summary"));
        assert!(!body.contains("quantile="), "unexpected quantiles in:\n{body}");
        assert_eq!(
            sample_value(&body, "test_phase_seconds_count", &[("phase", "load")]),
            Some(2.0)
        );
        assert_eq!(
            sample_value(&body, "test_phase_seconds_sum", &[("phase", "load")]),
            Some(1.0)
        );
    }

    #[test]
    fn test_histogram_uses_declared_buckets() {
        let registry = registry();
        registry
            .histogram("test_latency_seconds")
            .unwrap()
            .observe(&["render"], 0.5);

        let body = registry.collect_all().unwrap();

        assert_eq!(
            sample_value(
                &body,
                "test_latency_seconds_bucket",
                &[("kind", "render"), ("le", "0.1")]
            ),
            Some(0.0)
        );
        assert_eq!(
            sample_value(
                &body,
                "test_latency_seconds_bucket",
                &[("kind", "render"), ("le", "1")]
            ),
            Some(1.0)
        );
    }

    #[test]
    fn test_process_metrics_toggle() {
        let without = registry().collect_all().unwrap();
        assert!(!without.contains("process_start_time_seconds"));

        let with = RegistryBuilder::new()
            .register(REQUESTS)
            .and_then(RegistryBuilder::build)
            .unwrap()
            .collect_all()
            .unwrap();
        assert!(with.contains("# TYPE process_resident_memory_bytes gauge"));
    }

    #[test]
    fn test_upkeep_keeps_buffered_samples() {
        let registry = registry();
        let latency = registry.histogram("test_latency_seconds").unwrap();
        let phases = registry.summary("test_phase_seconds").unwrap();

        latency.observe(&["render"], 0.5);
        phases.observe(&["load"], 0.25);
        registry.run_upkeep();
        registry.run_upkeep();

        let body = registry.collect_all().unwrap();
        assert_eq!(
            sample_value(&body, "test_latency_seconds_count", &[("kind", "render")]),
            Some(1.0)
        );
        assert_eq!(
            sample_value(&body, "test_phase_seconds_sum", &[("phase", "load")]),
            Some(0.25)
        );

        latency.observe(&["render"], 2.0);
        registry.run_upkeep();

        let body = registry.collect_all().unwrap();
        assert_eq!(
            sample_value(&body, "test_latency_seconds_count", &[("kind", "render")]),
            Some(2.0)
        );
        assert_eq!(
            sample_value(&body, "test_latency_seconds_sum", &[("kind", "render")]),
            Some(2.5)
        );
    }

    #[tokio::test]
    async fn test_spawned_upkeep_stops_with_registry() {
        let registry = Arc::new(registry());
        let task = registry.spawn_upkeep(Duration::from_millis(10));

        registry
            .histogram("test_latency_seconds")
            .unwrap()
            .observe(&["render"], 0.5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert_eq!(
            sample_value(
                &registry.collect_all().unwrap(),
                "test_latency_seconds_count",
                &[("kind", "render")]
            ),
            Some(1.0)
        );

        drop(registry);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("upkeep task should stop")
            .unwrap();
    }

    #[test]
    fn test_content_type_is_prometheus_text() {
        assert_eq!(registry().content_type(), CONTENT_TYPE);
        assert!(CONTENT_TYPE.starts_with("text/plain; version=0.0.4"));
    }
}
