//! Signaling client error types

use thiserror::Error;

/// Errors from talking to the call service
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Network(String),

    /// The service answered with a failure envelope
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),
}

impl ClientError {
    /// Whether the service reported the call as unknown or already gone
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
