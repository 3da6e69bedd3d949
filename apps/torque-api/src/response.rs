//! Success envelope.
//!
//! Every handler answers `{status, message, data}`; errors use the same
//! shape through [`crate::error::ApiError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Success body.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

/// An envelope paired with the status code it is sent with.
#[derive(Debug)]
pub struct Reply<T> {
    code: StatusCode,
    body: Envelope<T>,
}

/// 200 OK.
pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Reply<T> {
    Reply {
        code: StatusCode::OK,
        body: Envelope {
            status: "success",
            message: message.into(),
            data,
        },
    }
}

/// 201 Created.
pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Reply<T> {
    Reply {
        code: StatusCode::CREATED,
        ..ok(message, data)
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self.body)).into_response()
    }
}
