//! Error conversions - HTTP rendering of [`AppError`]
//!
//! Behind the `axum` feature, [`AppError`] renders as the public JSON
//! envelope.

#[cfg(feature = "axum")]
use super::app_error::AppError;

// ============================================================================
// Axum conversions (feature-gated)
// ============================================================================

/// Every JSON response of the public API carries `success`; errors add `error`.
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::{HeaderValue, StatusCode, header};

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "success": false,
            "error": self.message(),
        });

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(all(test, feature = "axum"))]
mod tests {
    use super::*;

    #[test]
    fn test_into_response_sets_retry_after() {
        use axum::response::IntoResponse;

        let response = AppError::too_many_requests("Rate limited")
            .with_retry_after(42)
            .into_response();
        assert_eq!(response.status().as_u16(), 429);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "42"
        );
    }
}
