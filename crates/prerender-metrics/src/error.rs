//! Metrics error types.

use crate::registry::MetricKind;
use thiserror::Error;

/// Errors raised while building the registry or rendering its exposition.
///
/// Collector updates never produce errors: invalid values are skipped.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Metric registered twice: {0}")]
    DuplicateMetric(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Metric {name} is a {actual}, not a {expected}")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    #[error("Failed to build Prometheus recorder: {0}")]
    Exporter(String),

    #[error("Failed to encode metrics exposition: {0}")]
    Encode(#[from] std::fmt::Error),
}
