// Uniform success envelope for HTTP responses

use axum::Json;
use serde::Serialize;

/// Success envelope wrapping handler payloads.
///
/// Failures render through `AppError` with the same outer shape, so every
/// response body carries a `success` flag clients can branch on.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Success with a data payload and no message
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    /// Success with both a human-readable message and a data payload
    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    /// Success with a message only
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: None,
        })
    }
}
