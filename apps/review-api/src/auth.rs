//! Bearer-token authentication for the review routes.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme is matched case-insensitively per RFC 7235; the token itself
/// is returned verbatim.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    scheme.eq_ignore_ascii_case("Bearer").then_some(token)
}

/// Middleware guarding every `/review` route. A missing, malformed or
/// mismatched token is rejected before any handler runs.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::InvalidApiKey)?;

    if token != state.config.api_key {
        return Err(ApiError::InvalidApiKey);
    }

    Ok(next.run(request).await)
}
