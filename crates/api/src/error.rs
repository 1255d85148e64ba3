//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broker::BrokerError;
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
///
/// Bodies are `{error, message}`, where `error` is a stable kind and
/// `message` is human-readable.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Broker or CloudEvent error.
    Broker(BrokerError),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NotFound", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Broker(err) => broker_error_to_response(err),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = kind, %message, "request failed");
        } else {
            tracing::debug!(error = kind, %message, "request rejected");
        }

        let body = serde_json::json!({ "error": kind, "message": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, &'static str, String) {
    match &err {
        DomainError::Validation(reason) => {
            (StatusCode::BAD_REQUEST, "ValidationError", reason.clone())
        }
        DomainError::Publish(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "PublishError",
            err.to_string(),
        ),
        DomainError::Persistence(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "PersistenceError",
            err.to_string(),
        ),
        DomainError::Serialization(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
            err.to_string(),
        ),
    }
}

fn broker_error_to_response(err: BrokerError) -> (StatusCode, &'static str, String) {
    match &err {
        BrokerError::MalformedEvent(reason) => {
            (StatusCode::BAD_REQUEST, "MalformedEvent", reason.clone())
        }
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            "BrokerUnavailable",
            err.to_string(),
        ),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        ApiError::Broker(err)
    }
}
