//! Gateway error types and their HTTP representations

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("rate limit exceeded, try again later")]
    RateLimited,

    #[error("error forwarding request to {service}")]
    Forwarding { service: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response format returned to clients
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::UnknownService(_) => {
                (StatusCode::NOT_FOUND, "not_found_error", Some("unknown_service"))
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                Some("rate_limit_exceeded"),
            ),
            AppError::Forwarding { .. } => {
                (StatusCode::BAD_GATEWAY, "bad_gateway", Some("forwarding_failed"))
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        };

        // Internal detail stays in the logs; clients get a stable message.
        let message = match &self {
            AppError::Config(_) | AppError::Internal(_) => {
                error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message,
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
