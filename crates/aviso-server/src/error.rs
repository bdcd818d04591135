//! Server and HTTP error types.

use std::any::Any;

use aviso_core::InvalidAccountId;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Body `error` text of a 500 response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Error interno del servidor";

/// Failures starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Other socket error.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The path named an unusable account id.
    #[error(transparent)]
    InvalidAccountId(#[from] InvalidAccountId),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidAccountId(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Turn a handler panic into a 500 with a generic body.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "http handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": INTERNAL_ERROR_MESSAGE })),
    )
        .into_response()
}
