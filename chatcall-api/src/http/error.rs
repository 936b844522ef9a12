//! Error rendering for HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Shorthand for handler return types
pub type AppResult<T> = Result<T, AppError>;

/// Handler error carrying the status it should render as.
///
/// Renders with the same `{success: false, message}` envelope successful
/// responses use, so clients can branch on one flag.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "message": self.message,
        }));

        (self.status, body).into_response()
    }
}

/// Map the core taxonomy onto statuses. Internal detail never crosses the
/// boundary; it is logged here and replaced with a generic message.
impl From<chatcall_core::Error> for AppError {
    fn from(err: chatcall_core::Error) -> Self {
        use chatcall_core::Error;

        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::Authentication(msg) => Self::unauthorized(msg),
            Error::Authorization(msg) => Self::forbidden(msg),
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::Serialization(e) => {
                tracing::error!("Serialization failure: {e}");
                Self::internal_server_error("Internal data error")
            }
            Error::Configuration(msg) | Error::Internal(msg) => {
                tracing::error!("Internal failure: {msg}");
                Self::internal_server_error("Internal server error")
            }
        }
    }
}
