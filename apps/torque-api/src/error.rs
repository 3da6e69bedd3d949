//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Torque API                             │
//! │                                                                         │
//! │  Client                      Rust Backend                               │
//! │  ──────                      ────────────                               │
//! │                                                                         │
//! │  POST /service-jobs/7/status                                            │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Handler                                                         │  │
//! │  │  ApiResult<Json<Envelope<T>>>                                    │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Bad body / id?  ─── JsonRejection / PathRejection ──┐          │  │
//! │  │         │                                             │          │  │
//! │  │         ▼                                             ▼          │  │
//! │  │  Repository error ─── DbError::kind() ─────────── ApiError ────►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ◄──── 400 {"status":"error","message":"...","data":null,              │
//! │              "error":"INVALID_TRANSITION"}                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Downstream failures are logged here with their detail and leave the
//! process with a generic message.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use torque_core::{CoreError, ErrorKind, ValidationError};
use torque_db::DbError;

/// Error returned from every handler.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Taxonomy entry, decides the status code and the `error` field
    pub kind: ErrorKind,

    /// Human-readable error message for display
    pub message: String,
}

/// Handler result alias.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error envelope body.
///
/// ```json
/// {
///   "status": "error",
///   "message": "service job not found: 42",
///   "data": null,
///   "error": "NOT_FOUND"
/// }
/// ```
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
    data: Option<()>,
    error: &'static str,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ApiError {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        ApiError::new(ErrorKind::InvalidInput, message)
    }

    pub fn status_code(&self) -> StatusCode {
        status_for(self.kind)
    }
}

/// Kind → HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::Integrity | ErrorKind::InsufficientStock => {
            StatusCode::CONFLICT
        }
        ErrorKind::InvalidInput | ErrorKind::InvalidState | ErrorKind::InvalidTransition => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Downstream => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status: "error",
            message: &self.message,
            data: None,
            error: self.kind.code(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Downstream {
            // Log the actual error but return a generic message
            tracing::error!(error = %err, "Storage operation failed");
            return ApiError::new(kind, "Database operation failed");
        }
        ApiError::new(kind, err.to_string())
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::new(err.kind(), err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_input(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Integrity), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::InsufficientStock), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::InvalidState), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidTransition), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::Downstream),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_downstream_message_is_generic() {
        let err: ApiError = DbError::QueryFailed("disk I/O error at page 12".to_string()).into();
        assert_eq!(err.kind, ErrorKind::Downstream);
        assert_eq!(err.message, "Database operation failed");
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let response = ApiError::not_found("customer not found: 9").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "customer not found: 9");
        assert!(body["data"].is_null());
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
