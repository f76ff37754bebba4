//! Unified error types for the calculation agent

use thiserror::Error;

/// Unified error type for all pipeline stages
#[derive(Error, Debug)]
pub enum CalcError {
    /// Transport-level failure talking to the coordinator
    #[error("Network error: {0}")]
    Network(String),

    /// Coordinator answered with something other than 200
    #[error("Coordinator returned {status}: {message}")]
    Protocol { status: u16, message: String },

    /// Malformed JSON, data URI, base64 or trigger payload
    #[error("Format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CalcError {
    fn from(err: serde_json::Error) -> Self {
        CalcError::Format(err.to_string())
    }
}

/// Result type alias using CalcError
pub type Result<T> = std::result::Result<T, CalcError>;
