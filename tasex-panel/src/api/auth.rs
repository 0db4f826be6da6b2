//! Owner authentication middleware
//!
//! Owner routes require the `x-owner-secret` header to match the shared
//! secret stored in the settings table. A secret of `0` disables the check.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

pub const OWNER_SECRET_HEADER: &str = "x-owner-secret";

/// Authentication middleware for owner routes
///
/// Returns 401 Unauthorized when the header is missing or does not match.
pub async fn owner_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Special case: secret = 0 disables owner checking
    if state.owner_secret == 0 {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(OWNER_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok());

    match provided {
        Some(secret) if secrets_match(secret, state.owner_secret) => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %request.uri().path(), "Owner secret mismatch");
            Err(ApiError::Unauthorized("Invalid owner secret".to_string()))
        }
        None => {
            warn!(path = %request.uri().path(), "Owner secret missing");
            Err(ApiError::Unauthorized(format!(
                "Missing {} header",
                OWNER_SECRET_HEADER
            )))
        }
    }
}

/// Compare secrets without exiting early on the first differing byte
fn secrets_match(provided: i64, expected: i64) -> bool {
    provided
        .to_le_bytes()
        .iter()
        .zip(expected.to_le_bytes().iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
