//! Error types for encore-relay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Listener could not be bound
    #[error("Bind error: {0}")]
    Bind(String),

    #[error("HTTP server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
