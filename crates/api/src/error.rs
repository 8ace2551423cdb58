//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use engine::EngineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Engine-level failure.
    Engine(EngineError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            ApiError::Engine(err) => engine_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, false)
            }
        };

        let body = serde_json::json!({ "error": message });
        let mut response = (status, axum::Json(body)).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, "1".parse().unwrap());
        }
        response
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String, bool) {
    let status = match &err {
        EngineError::ProductNotFound(_)
        | EngineError::HoldNotFound(_)
        | EngineError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InsufficientStock { .. } => StatusCode::CONFLICT,
        EngineError::HoldExpired(_) => StatusCode::GONE,
        EngineError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        EngineError::LockTimeout(_) | EngineError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Domain(DomainError::InvalidQuantity(_)) => StatusCode::BAD_REQUEST,
        EngineError::Domain(DomainError::InvalidTransition { .. }) => StatusCode::CONFLICT,
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        tracing::error!(error = %err, "dependency failure");
    }
    (status, err.to_string(), err.is_retryable())
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}
