//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart_service::{ErrorCategory, ServiceError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Error reported by the cart service.
    Service(ServiceError),
    /// The request body could not be parsed.
    BadRequest(String),
}

impl ApiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Service(err) => err.category(),
            ApiError::BadRequest(_) => ErrorCategory::Validation,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::InvalidState | ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Upstream => StatusCode::BAD_GATEWAY,
            ErrorCategory::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let category = self.category();
        let message = match self {
            ApiError::Service(err) => err.to_string(),
            ApiError::BadRequest(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(%category, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message, "category": category });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
