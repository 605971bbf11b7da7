//! Prerender service error types.
//!
//! Render failures never surface here; they become error results that flow
//! through the plugin chain. The only request-level failure is a render
//! target that cannot be parsed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Prerender service error type.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// 400 Bad Request. The reason is returned to the client as-is.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ServiceError::BadRequest(reason) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
