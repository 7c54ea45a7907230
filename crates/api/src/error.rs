//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Every response carries a JSON body `{"error": <message>, "code": <code>}`.
/// Business rejections and transient conflicts share `409` but never a code.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// The caller did not identify itself.
    #[error("{0}")]
    Unauthorized(String),

    /// The caller's role lacks the capability.
    #[error("{0}")]
    Forbidden(String),

    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status and machine-readable code for the error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Domain(err) => (domain_status(err), err.code()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err.code() {
        "insufficient_stock"
        | "release_exceeds_reserved"
        | "invalid_state"
        | "conflict"
        | "duplicate_sequence" => StatusCode::CONFLICT,
        "exceeds_available" => StatusCode::UNPROCESSABLE_ENTITY,
        "not_found" => StatusCode::NOT_FOUND,
        "invalid_input" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        metrics::counter!("api_errors_total", "code" => code).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = serde_json::json!({ "error": self.to_string(), "code": code });
        (status, axum::Json(body)).into_response()
    }
}
