//! Error types for wren-stream

use thiserror::Error;

/// Result type alias using wren-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the transport boundary
#[derive(Error, Debug)]
pub enum Error {
    /// The backend transport failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend does not know the session
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The request was aborted via its cancellation handle
    #[error("request aborted")]
    Aborted,
}

impl Error {
    /// Check if this error represents user-initiated cancellation rather
    /// than a real failure
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
