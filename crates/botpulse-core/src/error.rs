//! Unified error types for botpulse

use thiserror::Error;

/// Unified error type for all botpulse operations
#[derive(Error, Debug)]
pub enum BotpulseError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid sink endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    // Sink errors
    #[error("Sink write failed: {0}")]
    Sink(String),

    #[error("Sink rejected point ({status}): {body}")]
    SinkRejected { status: u16, body: String },

    #[error("Point '{0}' has no fields left to write")]
    EmptyPoint(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using BotpulseError
pub type Result<T> = std::result::Result<T, BotpulseError>;
