//! Error types for the service

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowcast_core::FlowcastError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime failures
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Engine error
    #[error(transparent)]
    Engine(#[from] FlowcastError),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error body returned by the API
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable code
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
}

/// Request failure mapped to an HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    /// 400 with `message`
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                code: "bad_request",
                message: message.into(),
            },
        }
    }

    /// Status this error maps to
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<FlowcastError> for ApiError {
    fn from(err: FlowcastError) -> Self {
        let (status, code) = match &err {
            FlowcastError::InvalidRule(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_rule"),
            FlowcastError::MalformedFrame { .. } => (StatusCode::BAD_REQUEST, "malformed_frame"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self {
            status,
            body: ErrorResponse {
                code,
                message: err.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            body: ErrorResponse {
                code: "invalid_body",
                message: rejection.body_text(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
