//! Prerender service configuration.
//!
//! Configuration is loaded from environment variables. Nothing here is
//! secret, so `Debug` is derived.

use prerender_metrics::DEFAULT_METRICS_PATH;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default time a render may take before it is abandoned.
pub const DEFAULT_PAGE_LOAD_TIMEOUT_MS: u64 = 3000;

/// Default outer request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Prerender service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Path serving the Prometheus exposition (default: "/metrics").
    pub metrics_path: String,

    /// Time a single render may take (default: 3000ms).
    pub page_load_timeout: Duration,

    /// Outer timeout applied to every HTTP request (default: 30s).
    pub request_timeout_seconds: u64,

    /// Graceful shutdown drain period in seconds (default: 0).
    pub drain_seconds: u64,

    /// Whether process and runtime gauges are exposed (default: true).
    pub process_metrics: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid metrics path: {0}")]
    InvalidMetricsPath(String),

    #[error("Invalid page load timeout configuration: {0}")]
    InvalidPageLoadTimeout(String),

    #[error("Invalid request timeout configuration: {0}")]
    InvalidRequestTimeout(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainSeconds(String),

    #[error("Invalid process metrics flag: {0}")]
    InvalidProcessMetrics(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let metrics_path = vars
            .get("METRICS_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string());
        if !metrics_path.starts_with('/') {
            return Err(ConfigError::InvalidMetricsPath(format!(
                "METRICS_PATH must start with '/', got '{}'",
                metrics_path
            )));
        }

        let page_load_timeout_ms = if let Some(value_str) = vars.get("PAGE_LOAD_TIMEOUT_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidPageLoadTimeout(format!(
                    "PAGE_LOAD_TIMEOUT_MS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidPageLoadTimeout(
                    "PAGE_LOAD_TIMEOUT_MS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_PAGE_LOAD_TIMEOUT_MS
        };

        let request_timeout_seconds =
            if let Some(value_str) = vars.get("REQUEST_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidRequestTimeout(format!(
                        "REQUEST_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidRequestTimeout(
                        "REQUEST_TIMEOUT_SECONDS must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_REQUEST_TIMEOUT_SECONDS
            };

        let drain_seconds = match vars.get("PRERENDER_DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainSeconds(format!(
                    "PRERENDER_DRAIN_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => 0,
        };

        let process_metrics = match vars.get("PROCESS_METRICS").map(String::as_str) {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidProcessMetrics(format!(
                    "PROCESS_METRICS must be true or false, got '{}'",
                    other
                )))
            }
        };

        Ok(Config {
            bind_address,
            metrics_path,
            page_load_timeout: Duration::from_millis(page_load_timeout_ms),
            request_timeout_seconds,
            drain_seconds,
            process_metrics,
        })
    }
}
