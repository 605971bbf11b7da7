//! Graceful shutdown trigger for `axum::serve`.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// Resolves on SIGINT or SIGTERM, after waiting `drain` so in-flight
/// renders can finish.
pub async fn shutdown_signal(drain: Duration) {
    drain_after(os_signal(), drain).await;
}

/// Wait for `signal`, log which one arrived, then hold for `drain`.
pub async fn drain_after<F>(signal: F, drain: Duration)
where
    F: Future<Output = &'static str>,
{
    let received = signal.await;
    info!(
        target: "prerender.service",
        signal = received,
        drain_ms = drain.as_millis() as u64,
        "Shutdown requested"
    );
    if !drain.is_zero() {
        tokio::time::sleep(drain).await;
    }
}

async fn os_signal() -> &'static str {
    #[cfg(unix)]
    let sigterm = async {
        let Ok(mut stream) = signal::unix::signal(signal::unix::SignalKind::terminate()) else {
            error!(target: "prerender.service", "SIGTERM handler unavailable, relying on SIGINT");
            return std::future::pending::<&'static str>().await;
        };
        stream.recv().await;
        "SIGTERM"
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&'static str>();

    let sigint = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(target: "prerender.service", error = %e, "SIGINT handler unavailable");
            return std::future::pending::<&'static str>().await;
        }
        "SIGINT"
    };

    tokio::select! {
        name = sigint => name,
        name = sigterm => name,
    }
}
