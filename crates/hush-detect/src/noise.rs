//! Filler utterance filter.

/// Prefixes that mark an utterance as conversational filler.
pub const FILLER_PREFIXES: [&str; 6] = ["um", "uh", "hmm", "ah", "oh", "well"];

/// Utterances with at least this many tokens are never noise.
const MAX_NOISE_TOKENS: usize = 3;

/// Rejects short filler utterances before they reach classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseFilter;

impl NoiseFilter {
    pub fn new() -> Self {
        Self
    }

    /// True only if the utterance starts with a filler prefix and is shorter
    /// than three whitespace tokens.
    pub fn is_noise(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        let starts_with_filler = FILLER_PREFIXES.iter().any(|f| lower.starts_with(f));
        starts_with_filler && lower.split_whitespace().count() < MAX_NOISE_TOKENS
    }
}
