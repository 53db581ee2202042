//! Error types for answer generation and session handling.

use hush_core::error::HushError;

/// Failures of a single generation call.
///
/// All of these are recoverable: the orchestrator logs them and either
/// substitutes the fallback answer or drops the fragment.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {0}s")]
    Timeout(u64),
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("generation backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
    #[error("generation returned an empty answer")]
    EmptyResponse,
    #[error("generation backend is not configured: {0}")]
    Unconfigured(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Request(err.to_string())
    }
}

/// Errors from the orchestrator and session manager.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session already exists: {0}")]
    SessionExists(String),
    #[error("session closed: {0}")]
    SessionClosed(String),
    #[error("{0} lock poisoned")]
    LockPoisoned(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("transcription error: {0}")]
    Transcription(String),
    #[error("no transcriber configured")]
    TranscriberUnavailable,
}

impl From<AssistError> for HushError {
    fn from(err: AssistError) -> Self {
        match err {
            AssistError::Generation(e) => HushError::Generation(e.to_string()),
            AssistError::Transcription(msg) => HushError::Transcription(msg),
            AssistError::TranscriberUnavailable => {
                HushError::Transcription("no transcriber configured".to_string())
            }
            other => HushError::Session(other.to_string()),
        }
    }
}
