//! Error types for chronicle-core.

use thiserror::Error;

use crate::engine::EngineError;

/// Result type alias using chronicle-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for chronicle operations
#[derive(Error, Debug)]
pub enum Error {
    // Tier store errors
    #[error("Tier store request failed: {0}")]
    Store(String),

    #[error("Tier store returned status {status}: {body}")]
    StoreStatus { status: u16, body: String },

    #[error("Tier store returned a malformed record: {0}")]
    MalformedRecord(String),

    // Summarization engine errors
    #[error("Summarization engine failed: {0}")]
    Engine(#[from] EngineError),

    // Buffer errors
    #[error("Chat buffer lock poisoned")]
    LockPoisoned,

    #[error("Chat event has empty content")]
    EmptyEvent,

    // Control-signal errors
    #[error("Unknown control signal: {0}")]
    UnknownSignal(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error from any transport failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Store(err.to_string())
    }
}
