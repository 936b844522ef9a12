use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error taxonomy. The HTTP layer maps each variant onto a
/// status code, so services never deal in statuses directly.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not allowed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error carries details that must not reach a client.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Configuration(_) | Self::Serialization(_))
    }
}
