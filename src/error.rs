//! Error types for Janus Cast

use thiserror::Error;

/// Main error type for Janus Cast
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more request fields failed validation. Every violation is kept.
    #[error("Cannot send: {}", .0.join(" | "))]
    Validation(Vec<String>),

    /// A path-shaped payload could not be read
    #[error("Failed to read file: {0}")]
    PayloadFile(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Request ignored: already sending")]
    Busy,

    #[error("Log store error: {0}")]
    LogStore(String),

    #[error("Display error: {0}")]
    Display(String),
}

impl Error {
    /// Violations carried by a validation failure, empty for other errors
    pub fn violations(&self) -> &[String] {
        match self {
            Error::Validation(details) => details,
            _ => &[],
        }
    }
}

/// Result type alias for Janus Cast
pub type Result<T> = std::result::Result<T, Error>;
