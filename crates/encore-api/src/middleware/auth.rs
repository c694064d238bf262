//! Admin key authentication
//!
//! Admin routes require `Authorization: Bearer <key>` when `api.admin_key`
//! is configured and are open otherwise.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::server::AppState;

pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(admin_key) = state.config.api.admin_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    if bearer_key(request.headers()) == Some(admin_key) {
        Ok(next.run(request).await)
    } else {
        warn!(
            method = %request.method(),
            "Rejected admin request to {}",
            request.uri().path()
        );
        Err(ApiError::AuthFailed)
    }
}

/// The key of an `Authorization: Bearer <key>` header. The scheme is matched exactly.
fn bearer_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|key| !key.is_empty())
}
