use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// A single field-level schema violation, reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    /// `required` or `wrong_type`.
    pub code: String,
    pub message: String,
}

impl Violation {
    pub fn required(field: &str) -> Self {
        Self {
            field: field.to_string(),
            code: "required".into(),
            message: format!("field '{}' is required", field),
        }
    }

    pub fn wrong_type(field: &str, expected: &str) -> Self {
        Self {
            field: field.to_string(),
            code: "wrong_type".into(),
            message: format!("field '{}' must be of type {}", field, expected),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("schema validation failed")]
    Validation(Vec<Violation>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("service expired or destroyed")]
    Gone,

    #[error("invalid or missing service token")]
    Unauthorized,

    #[error("service has no configured token")]
    Forbidden,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                "payload does not match the declared schema".to_string(),
            ),
            AppError::BadRequest(m) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                m.clone(),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                format!("{} not found", what),
            ),
            AppError::Gone => (
                StatusCode::GONE,
                "expired_error",
                "service_expired",
                "service expired or destroyed".to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_service_token",
                "invalid or missing service token".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "authentication_error",
                "token_not_configured",
                "service has no configured token".to_string(),
            ),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate_limit_exceeded",
                "rate limit exceeded".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let mut error = json!({
            "message": msg,
            "type": error_type,
            "code": code,
        });

        if let AppError::Validation(violations) = &self {
            error["violations"] = serde_json::to_value(violations).unwrap_or_default();
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();

        if let AppError::RateLimited { retry_after } = self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("retry-after", val);
            }
        }

        response
    }
}
