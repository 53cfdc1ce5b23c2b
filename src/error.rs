//! Error types for beacon-voice

use thiserror::Error;

/// Result type alias for beacon-voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in beacon-voice
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio device missing or unplugged
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech recognizer error
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Upstream completion endpoint error
    #[error("upstream error: {0}")]
    Upstream(String),

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
