//! Error types for folio-server
//!
//! Every handler returns [`ApiResult`]; errors render as
//! `{"error": {"code": ..., "message": ...}}` with a matching status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::identity::IdentityError;
use crate::services::converter::ConversionError;
use crate::services::image_generator::ImageApiError;
use crate::services::speech::SpeechApiError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or rejected credential (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not the owner (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Third-party service failed (502)
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Document conversion failed (500)
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// folio-common error
    #[error(transparent)]
    Common(#[from] folio_common::Error),
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected => ApiError::Unauthorized("Invalid or expired token".to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<ImageApiError> for ApiError {
    fn from(err: ImageApiError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<SpeechApiError> for ApiError {
    fn from(err: SpeechApiError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        ApiError::Conversion(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Conversion(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONVERSION_ERROR", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Common(err) => match err {
                folio_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                folio_common::Error::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg)
                }
                other => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    other.to_string(),
                ),
            },
        };

        if status.is_server_error() {
            error!(code = error_code, "{}", message);
        }

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
