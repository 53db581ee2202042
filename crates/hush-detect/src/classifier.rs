//! Tiered question classifier.
//!
//! Speech-to-text output rarely carries punctuation, so the classifier runs an
//! ordered cascade of cheap heuristics. Tiers are tried strictly in order and
//! the first one that fires decides the result; later tiers are never
//! consulted. Confidence values are calibrated constants per tier.

use std::sync::OnceLock;

use regex::Regex;

use hush_core::types::{ClassificationResult, QuestionType};

/// Question words that open a question.
pub const QUESTION_WORDS: [&str; 7] = ["what", "who", "where", "when", "why", "how", "which"];

/// Auxiliary verbs that open a yes/no question.
pub const QUESTION_AUXILIARIES: [&str; 14] = [
    "is", "are", "was", "were", "do", "does", "did", "can", "could", "would", "will", "should",
    "has", "have",
];

/// Subject pronouns that commonly follow a question opener.
pub const SUBJECT_PRONOUNS: [&str; 9] = ["you", "i", "we", "it", "they", "he", "she", "this", "that"];

/// Spoken connectors that delimit segments of run-on speech.
pub const SEGMENT_CONNECTORS: [&str; 7] = ["also", "and", "so", "but", "then", "hey", "hello"];

/// Phrases that introduce an indirect question.
pub const REQUEST_PHRASES: [&str; 7] = [
    "tell me",
    "let me know",
    "do you know",
    "any idea",
    "wondering if",
    "wondering about",
    "do you think",
];

/// Phrases that ask for the listener's view.
pub const OPINION_CUES: [&str; 2] = ["you think", "your opinion"];

/// Inputs shorter than this many characters (after trimming) are not classified.
const MIN_TEXT_CHARS: usize = 5;

/// Minimum tokens in a segment for a segment-initial cue to count.
const MIN_SEGMENT_TOKENS: usize = 3;

const TOO_SHORT: ClassificationResult = ClassificationResult::new(false, 0.0, QuestionType::None);
const STATEMENT: ClassificationResult =
    ClassificationResult::new(false, 0.20, QuestionType::Statement);

/// Text prepared once per classification and shared by every tier.
#[derive(Debug)]
pub struct Utterance<'a> {
    /// Input exactly as received.
    pub raw: &'a str,
    /// Trimmed, lower-cased input.
    pub lower: String,
}

impl<'a> Utterance<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            lower: raw.trim().to_lowercase(),
        }
    }
}

/// One heuristic in the cascade: a pure predicate and the result it yields.
#[derive(Clone, Copy)]
pub struct Tier {
    pub name: &'static str,
    pub predicate: fn(&Utterance<'_>) -> bool,
    pub result: ClassificationResult,
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier")
            .field("name", &self.name)
            .field("result", &self.result)
            .finish()
    }
}

/// Stateless question classifier. Identical input always yields an
/// identical result.
#[derive(Debug, Clone)]
pub struct QuestionClassifier {
    tiers: Vec<Tier>,
}

impl Default for QuestionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionClassifier {
    /// Create a classifier with the standard five-tier cascade.
    pub fn new() -> Self {
        let tiers = vec![
            Tier {
                name: "explicit_punctuation",
                predicate: has_question_mark,
                result: ClassificationResult::new(true, 0.98, QuestionType::ExplicitQ),
            },
            Tier {
                name: "segment_initial_cue",
                predicate: has_segment_initial_cue,
                result: ClassificationResult::new(true, 0.90, QuestionType::SegmentStartQ),
            },
            Tier {
                name: "adjacent_pronoun",
                predicate: has_adjacent_pronoun,
                result: ClassificationResult::new(true, 0.85, QuestionType::RegexPatternQ),
            },
            Tier {
                name: "request_phrase",
                predicate: has_request_phrase,
                result: ClassificationResult::new(true, 0.80, QuestionType::RequestPhraseQ),
            },
            Tier {
                name: "opinion_cue",
                predicate: has_opinion_cue,
                result: ClassificationResult::new(true, 0.75, QuestionType::OpinionQ),
            },
        ];
        Self { tiers }
    }

    /// The cascade, in evaluation order.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Classify a fragment of (already noise-filtered) text.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        if text.trim().chars().count() < MIN_TEXT_CHARS {
            return TOO_SHORT;
        }

        let utterance = Utterance::new(text);
        for tier in &self.tiers {
            if (tier.predicate)(&utterance) {
                tracing::trace!(tier = tier.name, "Classifier tier fired");
                return tier.result;
            }
        }
        STATEMENT
    }

    /// Pull the question out of a fragment. Currently the whole fragment.
    pub fn extract_question<'a>(&self, text: &'a str) -> &'a str {
        text
    }
}

// =============================================================================
// Tier predicates
// =============================================================================

fn has_question_mark(u: &Utterance<'_>) -> bool {
    u.raw.contains('?')
}

fn has_segment_initial_cue(u: &Utterance<'_>) -> bool {
    connector_regex().split(&u.lower).any(|segment| {
        let mut tokens = segment.split_whitespace();
        match tokens.next() {
            Some(first) if is_question_opener(first) => {
                1 + tokens.count() >= MIN_SEGMENT_TOKENS
            }
            _ => false,
        }
    })
}

fn has_adjacent_pronoun(u: &Utterance<'_>) -> bool {
    opener_pronoun_regex().is_match(&u.lower)
}

fn has_request_phrase(u: &Utterance<'_>) -> bool {
    REQUEST_PHRASES.iter().any(|p| u.lower.contains(p))
}

fn has_opinion_cue(u: &Utterance<'_>) -> bool {
    OPINION_CUES.iter().any(|p| u.lower.contains(p))
}

fn is_question_opener(token: &str) -> bool {
    QUESTION_WORDS.contains(&token) || QUESTION_AUXILIARIES.contains(&token)
}

fn connector_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\b(?:{})\b", SEGMENT_CONNECTORS.join("|")))
            .expect("Invalid connector regex")
    })
}

fn opener_pronoun_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let openers: Vec<&str> = QUESTION_AUXILIARIES
            .iter()
            .chain(QUESTION_WORDS.iter())
            .copied()
            .collect();
        Regex::new(&format!(
            r"(?i)\b(?:{})\b\s+\b(?:{})\b",
            openers.join("|"),
            SUBJECT_PRONOUNS.join("|")
        ))
        .expect("Invalid opener-pronoun regex")
    })
}
