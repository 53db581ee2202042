//! Wire events exchanged with the transport layer.
//!
//! Every event is a flat JSON record carrying a `type` tag, so a listener can
//! dispatch on one field without knowing the Rust enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContextSummary, QuestionType};

/// Default source tag for context pushed over a session.
pub const DEFAULT_CONTEXT_SOURCE: &str = "user_upload";

/// Events emitted by the assistant towards a listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AssistantEvent {
    /// Lifecycle notice, e.g. passive listening started.
    Status { status: String, message: String },

    /// Text produced by the transcription collaborator, for display only.
    Transcription {
        text: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// Classifier verdict for a non-noise fragment.
    QuestionDetection {
        text: String,
        is_question: bool,
        confidence: f64,
        question_type: QuestionType,
    },

    /// The respond gate passed and an answer is being generated.
    Processing { message: String },

    /// A short answer ready for spoken delivery.
    AiResponse {
        question: String,
        answer: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
        processing_time: f64,
        should_speak: bool,
    },

    /// The context store changed.
    ContextUpdated {
        message: String,
        summary: ContextSummary,
    },

    /// Conversation history was cleared.
    HistoryCleared { message: String },
}

impl AssistantEvent {
    /// The `type` tag of this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            AssistantEvent::Status { .. } => "status",
            AssistantEvent::Transcription { .. } => "transcription",
            AssistantEvent::QuestionDetection { .. } => "question_detection",
            AssistantEvent::Processing { .. } => "processing",
            AssistantEvent::AiResponse { .. } => "ai_response",
            AssistantEvent::ContextUpdated { .. } => "context_updated",
            AssistantEvent::HistoryCleared { .. } => "history_cleared",
        }
    }
}

/// Events delivered to a session by the transport layer.
///
/// Missing fields deserialize to empty values; a transcription without text
/// flows through the pipeline as empty input rather than failing to parse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Raw audio bytes for the transcription collaborator. On the wire the
    /// payload is a base64 string; a plain array of byte values also parses.
    AudioChunk {
        #[serde(default, with = "audio_payload")]
        audio: Vec<u8>,
    },

    /// Text already transcribed by the client.
    Transcription {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        confidence: Option<f64>,
    },

    /// Reference material for the context store.
    Context {
        #[serde(default)]
        content: String,
        #[serde(default = "default_context_source")]
        source: String,
        #[serde(default)]
        metadata: serde_json::Value,
    },

    ClearHistory,

    ClearContext,
}

fn default_context_source() -> String {
    DEFAULT_CONTEXT_SOURCE.to_string()
}

mod audio_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Payload {
        Encoded(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(audio: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(audio))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Payload::deserialize(deserializer)? {
            Payload::Encoded(text) => STANDARD
                .decode(text.trim())
                .map_err(|e| de::Error::custom(format!("invalid base64 audio: {}", e))),
            Payload::Bytes(bytes) => Ok(bytes),
        }
    }
}
