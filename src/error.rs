//! Error types for Nocturne

use thiserror::Error;

/// Result type alias for Nocturne operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the alert subsystem
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Reasoning service error (transport or malformed verdict)
    #[error("reasoning error: {0}")]
    Reasoning(String),

    /// Conversation context persistence error
    #[error("context store error: {0}")]
    Context(String),

    /// Unrecognized drowsiness level or channel name
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
