//! HTTP error handling for the web bridge.
//!
//! Core errors become JSON bodies with a status code derived from the
//! error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// API error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Error code (e.g., "E007" while a run is in progress)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create a new API error with code and message.
    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self.code.as_deref() {
            Some("E001") => StatusCode::SERVICE_UNAVAILABLE,
            Some("E002" | "E003") => StatusCode::UNAUTHORIZED,
            Some("E004") => StatusCode::INSUFFICIENT_STORAGE,
            Some("E005") => StatusCode::BAD_GATEWAY,
            Some("E006") => StatusCode::NOT_FOUND,
            Some("E007") => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_code("E006", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<crate::error::Error> for ApiError {
    fn from(err: crate::error::Error) -> Self {
        match err.code() {
            Some(code) => Self::with_code(code, err.to_string()),
            None => Self::new(err.to_string()),
        }
    }
}

/// Result type for web handlers.
pub type ApiResult<T> = Result<T, ApiError>;
