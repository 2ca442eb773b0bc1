//! Error types for hubrelay
//!
//! This module defines all error types used throughout the relay,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for relay operations
///
/// Protocol-level failures that happen while a turn is streaming are not
/// returned through this type; they are turned into `ChatEvent::Error`
/// values so callers always receive a well-formed response. The variants
/// here cover everything that fails *before* or *outside* a turn.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream denied the conversation handshake (missing or expired
    /// credentials). Not retryable without new credentials.
    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    /// Transient failure talking to the upstream over HTTP
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// The conversation socket dropped or failed mid-turn
    #[error("Socket connection dropped: {0}")]
    TransientSocket(String),

    /// A socket frame could not be parsed
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Image creation redirect did not carry a job id
    #[error("Not authenticated for image generation: {0}")]
    NotAuthenticated(String),

    /// Image result never became available
    #[error("Image generation produced no result after {attempts} polls")]
    PollExhausted {
        /// Number of poll attempts made
        attempts: u32,
    },

    /// The inbound request was rejected before any upstream call
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The caller-supplied correlation id could not be decoded
    #[error("Invalid correlation id: {0}")]
    InvalidCorrelationId(String),

    /// A second turn was started while one is still in flight
    #[error("A turn is already in progress for conversation {0}")]
    TurnInProgress(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for relay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need to branch on the failure kind downcast to [`RelayError`].
pub type Result<T> = anyhow::Result<T>;
