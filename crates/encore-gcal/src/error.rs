//! Error types for encore-gcal

use thiserror::Error;

/// encore-gcal error type
#[derive(Error, Debug)]
pub enum GcalError {
    #[error("Store error: {0}")]
    Store(#[from] encore_core::Error),

    #[error("Service account key error: {0}")]
    Key(String),

    #[error("JWT signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token exchange failed: {status} - {body}")]
    TokenExchange { status: u16, body: String },

    /// 401 from the events endpoint: the bearer token was rejected
    #[error("Bearer token rejected: {0}")]
    Unauthorized(String),

    #[error("Google API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// 404 or 410 from the events endpoint
    #[error("Event not found: {0}")]
    EventGone(String),

    #[error("Cannot build event: {0}")]
    Transform(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GcalError {
    /// Errors that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Key(_) | Self::Transform(_) => true,
            Self::Api { status, .. } => *status == 400,
            // invalid_grant or a disabled service account
            Self::TokenExchange { status, .. } => matches!(status, 400 | 401),
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GcalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_grant_is_permanent() {
        let invalid_grant = GcalError::TokenExchange {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        };
        assert!(invalid_grant.is_permanent());
        assert!(GcalError::TokenExchange { status: 401, body: String::new() }.is_permanent());
        assert!(!GcalError::TokenExchange { status: 503, body: String::new() }.is_permanent());
    }

    #[test]
    fn test_rejected_bearer_is_retried() {
        assert!(!GcalError::Unauthorized("expired".to_string()).is_permanent());
        assert!(!GcalError::Api { status: 403, body: "rateLimitExceeded".to_string() }.is_permanent());
        assert!(GcalError::Api { status: 400, body: String::new() }.is_permanent());
    }
}
