use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Which classifier tier produced a classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Input too short to classify.
    None,
    /// Literal question mark.
    ExplicitQ,
    /// A connector-delimited segment opens with a question word or auxiliary.
    SegmentStartQ,
    /// Question word or auxiliary directly followed by a subject pronoun.
    RegexPatternQ,
    /// Indirect request phrase such as "tell me".
    RequestPhraseQ,
    /// Opinion cue such as "you think".
    OpinionQ,
    /// No tier fired.
    Statement,
}

impl QuestionType {
    /// Wire tag, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::None => "none",
            QuestionType::ExplicitQ => "explicit_q",
            QuestionType::SegmentStartQ => "segment_start_q",
            QuestionType::RegexPatternQ => "regex_pattern_q",
            QuestionType::RequestPhraseQ => "request_phrase_q",
            QuestionType::OpinionQ => "opinion_q",
            QuestionType::Statement => "statement",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse listening state reported to clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningStatus {
    #[default]
    Idle,
    Listening,
    Processing,
    Responding,
}

// =============================================================================
// Pipeline values
// =============================================================================

/// One unit of transcribed text entering the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    /// Confidence reported by the transcription service (informational only).
    pub recognition_confidence: f64,
    pub received_at: DateTime<Utc>,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, recognition_confidence: f64) -> Self {
        Self {
            text: text.into(),
            recognition_confidence,
            received_at: Utc::now(),
        }
    }

    /// Number of whitespace-delimited tokens in the raw text.
    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Output of the question classifier. Never mutated after creation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_question: bool,
    pub confidence: f64,
    pub question_type: QuestionType,
}

impl ClassificationResult {
    pub const fn new(is_question: bool, confidence: f64, question_type: QuestionType) -> Self {
        Self {
            is_question,
            confidence,
            question_type,
        }
    }
}

/// A piece of uploaded reference material held by the context store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: Uuid,
    /// Content, already truncated to the store's per-entry cap.
    pub content: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    /// Word count of the content as uploaded, before truncation.
    pub word_count: usize,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Aggregate view over the context store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub count: usize,
    pub total_words: usize,
    /// Distinct sources, sorted.
    pub sources: Vec<String>,
}

/// One stored question/answer pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationExchange {
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationExchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            created_at: Utc::now(),
        }
    }
}

/// Result of answering a question. Not stored by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub question: String,
    pub answer: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    /// Wall time from fragment arrival to answer, in seconds.
    pub processing_duration_secs: f64,
}

/// Snapshot of the assistant's state for status endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: ListeningStatus,
    pub is_listening: bool,
    pub active_sessions: usize,
    pub context_entries: usize,
    pub history_exchanges: usize,
    pub last_activity: Option<DateTime<Utc>>,
}
