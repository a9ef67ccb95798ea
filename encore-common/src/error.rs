//! Common error types for encore

use thiserror::Error;

/// Common result type for encore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the encore crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML file could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A sync event arrived whose payload does not match its type tag
    #[error("Malformed sync event: {0}")]
    MalformedEvent(String),

    /// The room channel could not be established or has been torn down
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
