//! Renderers and render targets.
//!
//! A [`Renderer`] turns a [`RenderJob`] into a [`RenderResult`]. The service
//! ships [`HttpRenderer`], which fetches the page over HTTP without running
//! scripts. Browser-backed renderers plug in behind the same trait.

use async_trait::async_trait;
use axum::http::Uri;
use prerender_metrics::render::DEFAULT_RENDER_TYPE;
use prerender_metrics::RenderResult;
use reqwest::Url;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Render types a job may ask for.
pub const RENDER_TYPES: [&str; 5] = ["html", "png", "jpeg", "pdf", "har"];

/// Path of the query-parameter form of a render request.
pub const RENDER_PATH: &str = "/render";

/// Errors a renderer reports instead of a result.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Page load timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Unsupported render type: {0}")]
    UnsupportedRenderType(String),
}

impl RenderError {
    /// Status code recorded on the render result for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            RenderError::Timeout(_) => 504,
            RenderError::Upstream(_) => 502,
            RenderError::UnsupportedRenderType(_) => 400,
        }
    }
}

/// Reasons a request does not name a renderable target.
#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("Missing render target")]
    MissingTarget,

    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported target scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unknown renderType: {0}")]
    UnknownRenderType(String),
}

/// A page to render and the output format.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub url: Url,
    pub render_type: String,
}

impl RenderJob {
    /// Parse a render job from a request URI.
    ///
    /// Two forms are accepted:
    ///
    /// ```text
    /// /render?url=https%3A%2F%2Fexample.com%2F&renderType=pdf
    /// /https://example.com/page?renderType=pdf
    /// ```
    ///
    /// In the path form `renderType` is removed from the target's query.
    pub fn from_uri(uri: &Uri) -> Result<Self, TargetError> {
        let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

        let (raw_url, render_type) = if uri.path() == RENDER_PATH {
            let request = Url::parse(&format!("http://localhost{target}"))
                .map_err(|e| TargetError::InvalidUrl(e.to_string()))?;

            let mut raw_url = None;
            let mut render_type = None;
            for (key, value) in request.query_pairs() {
                match key.as_ref() {
                    "url" => raw_url = Some(value.into_owned()),
                    "renderType" => render_type = Some(value.into_owned()),
                    _ => {}
                }
            }
            (raw_url.ok_or(TargetError::MissingTarget)?, render_type)
        } else {
            let raw = target.strip_prefix('/').unwrap_or(target);
            if raw.is_empty() {
                return Err(TargetError::MissingTarget);
            }
            (raw.to_string(), None)
        };

        let mut url = Url::parse(&raw_url).map_err(|e| TargetError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TargetError::UnsupportedScheme(url.scheme().to_string()));
        }

        let render_type = match render_type {
            Some(tag) => Some(tag),
            None => take_query_param(&mut url, "renderType"),
        }
        .filter(|tag| !tag.is_empty())
        .unwrap_or_else(|| DEFAULT_RENDER_TYPE.to_string());

        if !RENDER_TYPES.contains(&render_type.as_str()) {
            return Err(TargetError::UnknownRenderType(render_type));
        }

        Ok(Self { url, render_type })
    }
}

/// Remove `name` from the URL's query and return its last value.
fn take_query_param(url: &mut Url, name: &str) -> Option<String> {
    let mut taken = None;
    let mut kept = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == name {
            taken = Some(value.into_owned());
        } else {
            kept.push((key.into_owned(), value.into_owned()));
        }
    }

    if taken.is_some() {
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }
    taken
}

/// Produces render results for jobs.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &RenderJob) -> Result<RenderResult, RenderError>;
}

/// Fetch-based renderer.
///
/// Fills `time_spent_loading_url` (request sent until headers received) and
/// `time_spent_parsing_page` (body read). Browser phases stay absent.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRenderer {
    pub fn new(timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Upstream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    fn map_error(&self, error: reqwest::Error) -> RenderError {
        if error.is_timeout() {
            RenderError::Timeout(self.timeout)
        } else {
            RenderError::Upstream(error.to_string())
        }
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, job: &RenderJob) -> Result<RenderResult, RenderError> {
        if job.render_type != DEFAULT_RENDER_TYPE {
            return Err(RenderError::UnsupportedRenderType(job.render_type.clone()));
        }

        let started = Instant::now();
        let response = self
            .client
            .get(job.url.clone())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let status_code = response.status().as_u16();
        let loading = started.elapsed();

        let started = Instant::now();
        let content = response.bytes().await.map_err(|e| self.map_error(e))?;
        let parsing = started.elapsed();

        debug!(
            target: "prerender.service.renderer",
            status_code,
            bytes = content.len(),
            "Page fetched"
        );

        Ok(RenderResult {
            status_code: Some(status_code),
            render_type: Some(job.render_type.clone()),
            content: Some(content),
            time_spent_loading_url: Some(millis(loading)),
            time_spent_parsing_page: Some(millis(parsing)),
            ..Default::default()
        })
    }
}
