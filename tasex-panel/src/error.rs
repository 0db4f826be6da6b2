//! HTTP error mapping for tasex-panel

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Lifecycle violation (409), e.g. editing questions of a started panel
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Access denied (403), e.g. anonymous access to a hidden panel
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or wrong owner secret (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<tasex_common::Error> for ApiError {
    fn from(err: tasex_common::Error) -> Self {
        use tasex_common::Error;

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::DuplicateResult { .. }
            | Error::AnswersAlreadyRecorded { .. }
            | Error::CodeRangeExhausted { .. } => ApiError::BadRequest(err.to_string()),
            Error::Lifecycle(msg) => ApiError::Conflict(msg),
            Error::AccessDenied(msg) => ApiError::Forbidden(msg),
            Error::Invariant(ref msg) => {
                error!(reason = %msg, "Invariant violation");
                ApiError::Internal(err.to_string())
            }
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                error!(error = %err, "Request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
