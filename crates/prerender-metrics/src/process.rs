//! Process and runtime gauges refreshed on every scrape.
//!
//! Everything here is best-effort. A host that cannot report a value simply
//! leaves the previous sample (or zero) in place.

use crate::collectors::metadata;
use crate::registry::MetricDescriptor;
use metrics::{Key, Recorder};
use metrics_exporter_prometheus::PrometheusRecorder;
use std::sync::Mutex;
use sysinfo::{Pid, System};
use tracing::debug;

pub const RESIDENT_MEMORY: MetricDescriptor = MetricDescriptor::gauge(
    "process_resident_memory_bytes",
    "Resident memory size in bytes",
);
pub const VIRTUAL_MEMORY: MetricDescriptor = MetricDescriptor::gauge(
    "process_virtual_memory_bytes",
    "Virtual memory size in bytes",
);
pub const START_TIME: MetricDescriptor = MetricDescriptor::gauge(
    "process_start_time_seconds",
    "Start time of the process since unix epoch in seconds",
);
pub const CPU_USAGE: MetricDescriptor = MetricDescriptor::gauge(
    "process_cpu_usage_percent",
    "CPU usage of the process since the previous scrape, in percent of one core",
);
pub const RUNTIME_WORKERS: MetricDescriptor = MetricDescriptor::gauge(
    "tokio_runtime_workers",
    "Number of worker threads used by the async runtime",
);
pub const RUNTIME_ALIVE_TASKS: MetricDescriptor = MetricDescriptor::gauge(
    "tokio_runtime_alive_tasks",
    "Number of tasks currently alive in the async runtime",
);
pub const RUNTIME_GLOBAL_QUEUE_DEPTH: MetricDescriptor = MetricDescriptor::gauge(
    "tokio_runtime_global_queue_depth",
    "Number of tasks waiting in the runtime's global queue",
);

pub(crate) const PROCESS_DESCRIPTORS: [MetricDescriptor; 7] = [
    RESIDENT_MEMORY,
    VIRTUAL_MEMORY,
    START_TIME,
    CPU_USAGE,
    RUNTIME_WORKERS,
    RUNTIME_ALIVE_TASKS,
    RUNTIME_GLOBAL_QUEUE_DEPTH,
];

/// Samples the current process through `sysinfo` and the current tokio runtime.
pub(crate) struct ProcessCollector {
    pid: Option<Pid>,
    // Kept across scrapes so CPU usage is a delta between two refreshes.
    system: Mutex<System>,
}

impl ProcessCollector {
    pub(crate) fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| debug!(target: "prerender.metrics", error = e, "Process stats unavailable"))
            .ok();

        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }

    pub(crate) fn refresh(&self, recorder: &PrometheusRecorder) {
        self.refresh_process(recorder);
        refresh_runtime(recorder);
    }

    fn refresh_process(&self, recorder: &PrometheusRecorder) {
        let Some(pid) = self.pid else {
            return;
        };
        let Ok(mut system) = self.system.lock() else {
            debug!(target: "prerender.metrics", "Process stats lock poisoned, skipping");
            return;
        };

        if !system.refresh_process(pid) {
            debug!(target: "prerender.metrics", "Process stats refresh failed");
            return;
        }
        let Some(process) = system.process(pid) else {
            return;
        };

        set(recorder, &RESIDENT_MEMORY, process.memory() as f64);
        set(recorder, &VIRTUAL_MEMORY, process.virtual_memory() as f64);
        set(recorder, &START_TIME, process.start_time() as f64);
        set(recorder, &CPU_USAGE, f64::from(process.cpu_usage()));
    }
}

fn refresh_runtime(recorder: &PrometheusRecorder) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    let metrics = handle.metrics();

    set(recorder, &RUNTIME_WORKERS, metrics.num_workers() as f64);
    set(recorder, &RUNTIME_ALIVE_TASKS, metrics.num_alive_tasks() as f64);
    set(
        recorder,
        &RUNTIME_GLOBAL_QUEUE_DEPTH,
        metrics.global_queue_depth() as f64,
    );
}

fn set(recorder: &PrometheusRecorder, descriptor: &MetricDescriptor, value: f64) {
    recorder
        .register_gauge(&Key::from_static_name(descriptor.name), &metadata())
        .set(value);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use crate::testing::sample_value;

    #[test]
    fn test_process_descriptors_are_unlabeled_gauges() {
        for descriptor in PROCESS_DESCRIPTORS {
            assert_eq!(descriptor.kind, crate::registry::MetricKind::Gauge);
            assert!(descriptor.label_names.is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runtime_gauges_reported_inside_runtime() {
        let registry = RegistryBuilder::new().build().unwrap();

        let body = registry.collect_all().unwrap();

        assert_eq!(sample_value(&body, "tokio_runtime_workers", &[]), Some(2.0));
    }

    #[test]
    fn test_runtime_gauges_stay_zero_outside_runtime() {
        let registry = RegistryBuilder::new().build().unwrap();

        let body = registry.collect_all().unwrap();

        assert_eq!(sample_value(&body, "tokio_runtime_workers", &[]), Some(0.0));
    }
}
