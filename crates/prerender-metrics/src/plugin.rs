//! Lifecycle hook contract between the middleware chain and its plugins.
//!
//! The chain calls, per request:
//!
//! ```text
//! process_request ──handled──> response sent, nothing else runs
//!        │
//!        └─not handled─> request_received -> (render) -> before_send -> response sent
//! ```
//!
//! `request_received` and `before_send` receive a [`Next`] continuation and
//! must return the [`Proceed`] obtained by calling it. `Next` is consumed by
//! the call and `Proceed` cannot be built any other way, so a hook hands
//! control back to the chain exactly once.

use crate::render::RenderResult;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// Continuation handed to a lifecycle hook.
#[derive(Debug, Default)]
pub struct Next {
    _private: (),
}

impl Next {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Hand control back to the chain.
    pub fn call(self) -> Proceed {
        Proceed { _private: () }
    }
}

/// Proof that a hook called its continuation.
#[derive(Debug)]
#[must_use = "a hook must return the Proceed obtained from Next::call"]
pub struct Proceed {
    _private: (),
}

/// Information about the hosting server passed to [`Plugin::init`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    bind_address: String,
}

impl ServerHandle {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }
}

/// Request as seen by plugins.
#[derive(Debug, Clone)]
pub struct PrerenderRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Set by the renderer once a render ran, successfully or not.
    pub prerender: Option<RenderResult>,
}

impl PrerenderRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            prerender: None,
        }
    }

    /// Request target as received: path plus query string.
    pub fn target(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }
}

/// Response under construction by the chain.
#[derive(Debug, Clone, Default)]
pub struct PrerenderResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Option<Bytes>,
}

impl PrerenderResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Write the body and mark the response as finished.
    pub fn end(&mut self, body: impl Into<Bytes>) {
        self.body = Some(body.into());
    }

    pub fn is_ended(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

impl IntoResponse for PrerenderResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.unwrap_or_default()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// A plugin in the prerender middleware chain.
///
/// Every hook has a pass-through default so plugins only implement what
/// they need.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called once at startup, after the plugin is constructed.
    fn init(&self, _server: &ServerHandle) {}

    /// Return `true` when the plugin fully handled the request by writing
    /// `res`. No further hooks run and the renderer is not invoked.
    fn process_request(&self, _req: &PrerenderRequest, _res: &mut PrerenderResponse) -> bool {
        false
    }

    /// Called when a request enters the render pipeline.
    fn request_received(
        &self,
        _req: &mut PrerenderRequest,
        _res: &mut PrerenderResponse,
        next: Next,
    ) -> Proceed {
        next.call()
    }

    /// Called before the response is sent, whether or not a render ran.
    fn before_send(
        &self,
        _req: &mut PrerenderRequest,
        _res: &mut PrerenderResponse,
        next: Next,
    ) -> Proceed {
        next.call()
    }
}

/// `Content-Type` for a render type tag.
pub fn content_type_for(render_type: &str) -> HeaderValue {
    match render_type {
        "png" => HeaderValue::from_static("image/png"),
        "jpeg" => HeaderValue::from_static("image/jpeg"),
        "pdf" => HeaderValue::from_static("application/pdf"),
        "har" => HeaderValue::from_static("application/json"),
        _ => HeaderValue::from_static("text/html; charset=utf-8"),
    }
}

/// Build a response carrying a render result's status and content.
pub fn response_for(result: &RenderResult) -> PrerenderResponse {
    let mut res = PrerenderResponse::new();
    res.status = result
        .status_code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::GATEWAY_TIMEOUT);
    res.set_header(
        header::CONTENT_TYPE,
        content_type_for(result.render_type_label()),
    );
    res.end(result.content.clone().unwrap_or_default());
    res
}
