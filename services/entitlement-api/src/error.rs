//! Error types for the Entitlement API service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use scribe_core::QuotaError;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing x-user-id header")]
    MissingUserId,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Quota(#[from] QuotaError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingUserId => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Quota(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingUserId => "MISSING_USER_ID",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Quota(err) => err.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log internal errors
        if status.is_server_error() {
            tracing::error!(error = ?self, "Internal API error");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
