//! Trial Error Types
//!
//! This module provides trial-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use kernel::error::app_error::AppError;
use thiserror::Error;

/// Trial-specific result type alias
pub type TrialResult<T> = Result<T, TrialError>;

/// Trial-specific error variants
///
/// Server-side variants carry detail for logs only; clients see a generic
/// message.
#[derive(Debug, Error)]
pub enum TrialError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// Too many attempts for this client
    #[error("Too many requests. Try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    /// No completed verification to consume
    #[error("Please complete verification first")]
    NotVerified,

    /// Unknown token, or token bound to another session
    #[error("Invalid token")]
    InvalidToken,

    /// Token lifetime elapsed
    #[error("Token expired")]
    TokenExpired,

    /// Token already consumed
    #[error("Token already used")]
    TokenUsed,

    /// Persistence collaborator absent
    #[error("Server not configured")]
    NotConfigured,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrialError {
    /// Message safe to show the client
    pub fn public_message(&self) -> String {
        match self {
            TrialError::Database(_) | TrialError::Hashing(_) | TrialError::Internal(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            TrialError::Database(e) => {
                tracing::error!(error = %e, "Trial database error");
            }
            TrialError::Hashing(msg) => {
                tracing::error!(message = %msg, "Credential hashing failed");
            }
            TrialError::Internal(msg) => {
                tracing::error!(message = %msg, "Trial internal error");
            }
            TrialError::NotConfigured => {
                tracing::error!("Trial store is not configured");
            }
            TrialError::RateLimited { retry_after_secs } => {
                tracing::warn!(retry_after_secs, "Trial rate limit exceeded");
            }
            TrialError::InvalidToken | TrialError::TokenUsed => {
                tracing::warn!(error = %self, "Token rejected");
            }
            _ => {
                tracing::debug!(error = %self, "Trial error");
            }
        }
    }
}

impl IntoResponse for TrialError {
    fn into_response(self) -> Response {
        self.log();
        AppError::from(self).into_response()
    }
}

impl From<TrialError> for AppError {
    fn from(err: TrialError) -> Self {
        let message = err.public_message();
        match err {
            TrialError::Validation(_)
            | TrialError::InvalidToken
            | TrialError::TokenExpired
            | TrialError::TokenUsed => AppError::bad_request(message),
            TrialError::RateLimited { retry_after_secs } => {
                AppError::too_many_requests(message).with_retry_after(retry_after_secs)
            }
            TrialError::NotVerified => AppError::forbidden(message),
            TrialError::Database(e) => AppError::internal(message).with_source(e),
            TrialError::NotConfigured | TrialError::Hashing(_) | TrialError::Internal(_) => {
                AppError::internal(message)
            }
        }
    }
}

impl From<JsonRejection> for TrialError {
    fn from(rejection: JsonRejection) -> Self {
        TrialError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<platform::password::PasswordHashError> for TrialError {
    fn from(err: platform::password::PasswordHashError) -> Self {
        TrialError::Hashing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use kernel::error::kind::ErrorKind;
    use std::error::Error as _;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TrialError::Validation("x".into()), 400),
            (TrialError::RateLimited { retry_after_secs: 1 }, 429),
            (TrialError::NotVerified, 403),
            (TrialError::InvalidToken, 400),
            (TrialError::TokenExpired, 400),
            (TrialError::TokenUsed, 400),
            (TrialError::NotConfigured, 500),
            (TrialError::Hashing("x".into()), 500),
            (TrialError::Internal("x".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let app = AppError::from(TrialError::Internal("connection refused at 10.0.0.3".into()));
        assert_eq!(app.message(), "Internal server error");
        assert!(app.is_server_error());

        let app = AppError::from(TrialError::NotConfigured);
        assert_eq!(app.message(), "Server not configured");
    }

    #[test]
    fn test_database_error_kept_as_source() {
        let app = AppError::from(TrialError::Database(sqlx::Error::RowNotFound));
        assert_eq!(app.kind(), ErrorKind::InternalServerError);
        assert_eq!(app.message(), "Internal server error");
        assert!(app.source().is_some());
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let app = AppError::from(TrialError::RateLimited { retry_after_secs: 17 });
        assert_eq!(app.retry_after_secs(), Some(17));
        assert_eq!(app.status_code(), 429);
    }

    #[test]
    fn test_not_verified_response() {
        let response = TrialError::NotVerified.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
