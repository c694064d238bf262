//! Error types for encore-api

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// encore-api error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed")]
    AuthFailed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Google Calendar sync is disabled")]
    SyncDisabled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] encore_core::Error),
}

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use encore_core::Error as Core;
        match self {
            Self::AuthFailed => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SyncDisabled => StatusCode::CONFLICT,
            Self::Core(Core::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Core(Core::Validation { .. }) => StatusCode::BAD_REQUEST,
            Self::Core(Core::Constraint(_)) => StatusCode::CONFLICT,
            Self::Io(_) | Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (encore_core::Error::not_found("piece", 1), StatusCode::NOT_FOUND),
            (encore_core::Error::validation("calendar", "bad"), StatusCode::BAD_REQUEST),
            (encore_core::Error::Constraint("UNIQUE".into()), StatusCode::CONFLICT),
            (encore_core::Error::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_auth_failure_is_401() {
        assert_eq!(ApiError::AuthFailed.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
