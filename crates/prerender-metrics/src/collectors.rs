//! Typed collector handles.
//!
//! Handles are cheap to clone and `Send + Sync`. All arithmetic happens in the
//! exporter's atomics, so concurrent updates from many in-flight requests
//! need no extra locking.
//!
//! Label values are positional against the descriptor's label schema.
//! Observations that are not finite non-negative numbers are dropped.

use crate::error::MetricsError;
use crate::registry::{MetricDescriptor, MetricRegistry, RegistryBuilder};
use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::PrometheusRecorder;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bucket upper bounds (seconds) for the total render duration.
pub const DURATION_BUCKETS: [f64; 8] = [0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

pub const ACTIVE_REQUESTS: MetricDescriptor = MetricDescriptor::gauge(
    "prerender_active_requests",
    "Number of active prerender requests",
);

pub const REQUEST_DURATION: MetricDescriptor = MetricDescriptor::histogram(
    "prerender_requests_duration_seconds",
    "Total prerender duration in seconds",
    &["status_code", "render_type"],
    &DURATION_BUCKETS,
);

pub const RENDERED_BYTES: MetricDescriptor = MetricDescriptor::counter(
    "prerender_rendered_bytes_total",
    "Total prerender rendered bytes",
    &["status_code", "render_type"],
);

pub const PHASE_SECONDS: MetricDescriptor = MetricDescriptor::summary(
    "prerender_phase_seconds",
    "Total time spent in prerender phases (seconds)",
    &["phase", "status_code", "render_type"],
);

pub(crate) fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

fn is_valid_observation(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Recorder plus descriptor, shared by the labeled collector kinds.
#[derive(Clone)]
struct Series {
    recorder: Arc<PrometheusRecorder>,
    descriptor: MetricDescriptor,
}

impl Series {
    fn key(&self, label_values: &[&str]) -> Option<Key> {
        if label_values.len() != self.descriptor.label_names.len() {
            warn!(
                target: "prerender.metrics",
                metric = self.descriptor.name,
                expected = self.descriptor.label_names.len(),
                actual = label_values.len(),
                "Label arity mismatch, update skipped"
            );
            return None;
        }

        let labels: Vec<Label> = self
            .descriptor
            .label_names
            .iter()
            .zip(label_values)
            .map(|(name, value)| Label::new(*name, (*value).to_string()))
            .collect();

        Some(Key::from_parts(self.descriptor.name, labels))
    }

    fn observe(&self, label_values: &[&str], value: f64) {
        if !is_valid_observation(value) {
            debug!(
                target: "prerender.metrics",
                metric = self.descriptor.name,
                value,
                "Invalid observation skipped"
            );
            return;
        }
        if let Some(key) = self.key(label_values) {
            self.recorder.register_histogram(&key, &metadata()).record(value);
        }
    }
}

/// Unlabeled gauge.
#[derive(Clone)]
pub struct Gauge {
    name: &'static str,
    handle: metrics::Gauge,
}

impl Gauge {
    pub(crate) fn new(recorder: Arc<PrometheusRecorder>, descriptor: MetricDescriptor) -> Self {
        let handle =
            recorder.register_gauge(&Key::from_static_name(descriptor.name), &metadata());
        Self {
            name: descriptor.name,
            handle,
        }
    }

    pub fn set(&self, value: f64) {
        if !value.is_finite() {
            debug!(target: "prerender.metrics", metric = self.name, value, "Invalid gauge value skipped");
            return;
        }
        self.handle.set(value);
    }

    pub fn inc(&self) {
        self.handle.increment(1.0);
    }

    pub fn dec(&self) {
        self.handle.decrement(1.0);
    }
}

/// Labeled monotonic counter. There is no decrement.
#[derive(Clone)]
pub struct Counter {
    series: Series,
}

impl Counter {
    pub(crate) fn new(recorder: Arc<PrometheusRecorder>, descriptor: MetricDescriptor) -> Self {
        Self {
            series: Series {
                recorder,
                descriptor,
            },
        }
    }

    pub fn inc(&self, label_values: &[&str], amount: u64) {
        if let Some(key) = self.series.key(label_values) {
            self.series
                .recorder
                .register_counter(&key, &metadata())
                .increment(amount);
        }
    }
}

/// Labeled histogram with buckets fixed at registry construction.
#[derive(Clone)]
pub struct Histogram {
    series: Series,
}

impl Histogram {
    pub(crate) fn new(recorder: Arc<PrometheusRecorder>, descriptor: MetricDescriptor) -> Self {
        Self {
            series: Series {
                recorder,
                descriptor,
            },
        }
    }

    pub fn observe(&self, label_values: &[&str], value: f64) {
        self.series.observe(label_values, value);
    }
}

/// Labeled summary tracking count and sum per label set.
#[derive(Clone)]
pub struct Summary {
    series: Series,
}

impl Summary {
    pub(crate) fn new(recorder: Arc<PrometheusRecorder>, descriptor: MetricDescriptor) -> Self {
        Self {
            series: Series {
                recorder,
                descriptor,
            },
        }
    }

    pub fn observe(&self, label_values: &[&str], value: f64) {
        self.series.observe(label_values, value);
    }
}

/// The four prerender collectors.
#[derive(Clone)]
pub struct PrerenderCollectors {
    pub active_requests: Gauge,
    pub total_duration: Histogram,
    pub rendered_bytes: Counter,
    pub phase_seconds: Summary,
}

impl PrerenderCollectors {
    pub const DESCRIPTORS: [MetricDescriptor; 4] =
        [ACTIVE_REQUESTS, REQUEST_DURATION, RENDERED_BYTES, PHASE_SECONDS];

    /// Add the four prerender descriptors to a registry under construction.
    pub fn register(mut builder: RegistryBuilder) -> Result<RegistryBuilder, MetricsError> {
        for descriptor in Self::DESCRIPTORS {
            builder = builder.register(descriptor)?;
        }
        Ok(builder)
    }

    /// Resolve typed handles from a built registry.
    pub fn from_registry(registry: &MetricRegistry) -> Result<Self, MetricsError> {
        Ok(Self {
            active_requests: registry.gauge(ACTIVE_REQUESTS.name)?,
            total_duration: registry.histogram(REQUEST_DURATION.name)?,
            rendered_bytes: registry.counter(RENDERED_BYTES.name)?,
            phase_seconds: registry.summary(PHASE_SECONDS.name)?,
        })
    }
}
