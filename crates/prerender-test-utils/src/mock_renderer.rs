//! Scriptable renderer for tests.
//!
//! `MockRenderer` returns a canned outcome for every job, optionally after a
//! delay, and records the jobs it was asked to render.

use async_trait::async_trait;
use bytes::Bytes;
use prerender_metrics::RenderResult;
use prerender_service::renderer::{RenderError, RenderJob, Renderer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Failure a [`MockRenderer`] reports.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Upstream(String),
    UnsupportedRenderType,
}

/// Renderer returning a fixed outcome.
///
/// The canned result's `render_type` is replaced with the job's, so one mock
/// serves every render type.
pub struct MockRenderer {
    outcome: Result<RenderResult, MockFailure>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    jobs: Mutex<Vec<RenderJob>>,
}

impl MockRenderer {
    /// Render every job as a 200 with `body` and fixed phase timings:
    /// 10ms connecting, 5ms opening the tab, 100ms loading, 35ms parsing.
    pub fn html(body: &'static str) -> Self {
        Self::with_result(RenderResult {
            status_code: Some(200),
            content: Some(Bytes::from_static(body.as_bytes())),
            time_spent_connecting_to_browser: Some(10.0),
            time_spent_opening_tab: Some(5.0),
            time_spent_loading_url: Some(100.0),
            time_spent_parsing_page: Some(35.0),
            ..Default::default()
        })
    }

    /// Return `result` for every job.
    pub fn with_result(result: RenderResult) -> Self {
        Self::new(Ok(result))
    }

    /// Fail every job with an upstream error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(Err(MockFailure::Upstream(message.into())))
    }

    /// Reject every job's render type.
    pub fn unsupported() -> Self {
        Self::new(Err(MockFailure::UnsupportedRenderType))
    }

    fn new(outcome: Result<RenderResult, MockFailure>) -> Self {
        Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of render calls received, including ones still in progress.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Jobs received so far, in call order.
    pub fn jobs(&self) -> Vec<RenderJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, job: &RenderJob) -> Result<RenderResult, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().push(job.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Ok(result) => {
                let mut result = result.clone();
                result.render_type = Some(job.render_type.clone());
                Ok(result)
            }
            Err(MockFailure::Upstream(message)) => Err(RenderError::Upstream(message.clone())),
            Err(MockFailure::UnsupportedRenderType) => {
                Err(RenderError::UnsupportedRenderType(job.render_type.clone()))
            }
        }
    }
}
