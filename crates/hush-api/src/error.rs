//! API error types and JSON error response formatting.
//!
//! ApiError gives every endpoint the same JSON error shape and maps
//! orchestrator and session errors to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use hush_assist::AssistError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid input.
    BadRequest(String),
    /// 404 Not Found - unknown session.
    NotFound(String),
    /// 409 Conflict - session already open or already closed.
    Conflict(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 503 Service Unavailable - collaborator not configured.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), message = %message, "Request failed");
        }

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AssistError> for ApiError {
    fn from(err: AssistError) -> Self {
        match &err {
            AssistError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            AssistError::SessionExists(_) | AssistError::SessionClosed(_) => {
                ApiError::Conflict(err.to_string())
            }
            AssistError::TranscriberUnavailable | AssistError::Generation(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            AssistError::LockPoisoned(_) | AssistError::Transcription(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_from_assist_error() {
        assert!(matches!(
            ApiError::from(AssistError::SessionNotFound("a".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(AssistError::SessionExists("a".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(AssistError::TranscriberUnavailable),
            ApiError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            ApiError::from(AssistError::LockPoisoned("history".into())),
            ApiError::Internal(_)
        ));
    }
}
