// =============================================================================
// API Error Taxonomy — every handler failure maps to one JSON error shape
// =============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Failures a request handler can surface to the client.
///
/// Each variant owns its HTTP status and JSON body; handlers just `?` and let
/// the conversion below do the shaping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported indicators: {0}")]
    UnknownIndicator(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream request failed: {0}")]
    Upstream(anyhow::Error),

    #[error("storage failure: {0}")]
    Storage(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(detail) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": detail })),
            )
                .into_response(),

            ApiError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": detail })),
            )
                .into_response(),

            ApiError::UnknownIndicator(invalid) => {
                let invalid: Vec<&str> = invalid.split(',').map(str::trim).collect();
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Unsupported indicators requested",
                        "invalid": invalid,
                    })),
                )
                    .into_response()
            }

            ApiError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded",
                    "retryAfter": retry_after_secs,
                })),
            )
                .into_response(),

            ApiError::Upstream(e) => {
                warn!(error = %e, "upstream request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": "Upstream request failed",
                        "details": e.to_string(),
                    })),
                )
                    .into_response()
            }

            ApiError::Storage(e) => {
                error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal storage failure" })),
                )
                    .into_response()
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn statuses_match_variants() {
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownIndicator("zzz".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::RateLimited {
                retry_after_secs: 5
            }
            .into_response()
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Upstream(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Storage(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
