//! Error types for onboard-sync
//!
//! Only precondition and persistence failures become non-2xx responses.
//! Satellite failures are folded into response bodies by the pipeline and never
//! reach this type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use onboard_common::api::ApiAuthError;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Identity gate rejected the caller (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] ApiAuthError),

    /// Conflict (409) - e.g., forbidden status transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream fetch failed (502) - remote-file proxy only
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Upstream fetch timed out (504) - remote-file proxy only
    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// onboard-common error (persistence, config, validation)
    #[error("{0}")]
    Common(#[from] onboard_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(err) if err.is_forbidden() => {
                (StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string())
            }
            ApiError::Unauthorized(err) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string())
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", msg.clone()),
            ApiError::GatewayTimeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT", msg.clone())
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
            ApiError::Common(err) => {
                use onboard_common::Error;
                match err {
                    Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
                    Error::InvalidInput(msg) => {
                        (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
                    }
                    Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                    Error::Database(_) | Error::Json(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PERSISTENCE_ERROR",
                        err.to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        err.to_string(),
                    ),
                }
            }
        }
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(code = error_code, "Request failed: {}", message);
        } else {
            tracing::debug!(code = error_code, "Request rejected: {}", message);
        }

        let body = Json(json!({
            "success": false,
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
