//! Speech-to-text contract for raw audio chunks.

use async_trait::async_trait;

use crate::error::AssistError;

/// Text recognised from one audio chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// Self-reported recognition confidence in [0, 1].
    pub confidence: f64,
}

/// Turns audio bytes into text.
///
/// `Ok(None)` means the chunk held no recognisable speech; it is not an
/// error and produces no events.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<Option<Transcript>, AssistError>;
}
