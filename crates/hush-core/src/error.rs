use thiserror::Error;

/// Top-level error type for the Hush system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for HushError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HushError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for HushError {
    fn from(err: toml::de::Error) -> Self {
        HushError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HushError {
    fn from(err: toml::ser::Error) -> Self {
        HushError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for HushError {
    fn from(err: serde_json::Error) -> Self {
        HushError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Hush operations.
pub type Result<T> = std::result::Result<T, HushError>;
