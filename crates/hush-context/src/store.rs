//! Uploaded reference material and the recency-window selection policy.

use std::collections::{BTreeSet, VecDeque};

use chrono::Utc;
use uuid::Uuid;

use hush_core::types::{ContextEntry, ContextSummary};

/// A partially fitting entry is only included when more than this many
/// characters of budget remain.
const MIN_PARTIAL_CHARS: usize = 100;

/// Separator placed between entries in the selected window.
const ENTRY_SEPARATOR: &str = "\n\n";

// =============================================================================
// ContextStore
// =============================================================================

/// Append-only store of context entries.
///
/// Content is truncated to `max_entry_chars` at insertion, so no stored
/// entry ever exceeds the cap. Lengths are measured in characters.
#[derive(Debug, Clone)]
pub struct ContextStore {
    entries: Vec<ContextEntry>,
    max_entry_chars: usize,
}

impl ContextStore {
    /// Create an empty store with the given per-entry character cap.
    pub fn new(max_entry_chars: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entry_chars,
        }
    }

    pub fn max_entry_chars(&self) -> usize {
        self.max_entry_chars
    }

    /// Append an entry. Never replaces an existing one.
    ///
    /// The word count is taken from `content` as given, before truncation.
    pub fn add(&mut self, content: &str, source: &str, metadata: serde_json::Value) -> Uuid {
        let entry = ContextEntry {
            id: Uuid::new_v4(),
            content: truncate_chars(content, self.max_entry_chars).to_string(),
            source: source.to_string(),
            created_at: Utc::now(),
            word_count: content.split_whitespace().count(),
            metadata,
        };
        let id = entry.id;

        tracing::info!(
            source = %source,
            chars = content.chars().count(),
            stored_chars = entry.content.chars().count(),
            "Context added"
        );

        self.entries.push(entry);
        id
    }

    /// Select the most recent context that fits within `max_length` characters.
    ///
    /// Walks entries newest to oldest, taking whole entries while they fit.
    /// The first entry that does not fit contributes a prefix of the
    /// remaining budget if that budget exceeds 100 characters, and the walk
    /// stops there. Selected entries keep chronological order and are joined
    /// by a blank line.
    pub fn relevant(&self, max_length: usize) -> String {
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for entry in self.entries.iter().rev() {
            let len = entry.content.chars().count();
            if total + len <= max_length {
                window.push_front(&entry.content);
                total += len;
                continue;
            }

            let remaining = max_length - total;
            if remaining > MIN_PARTIAL_CHARS {
                window.push_front(truncate_chars(&entry.content, remaining));
            }
            break;
        }

        window.into_iter().collect::<Vec<_>>().join(ENTRY_SEPARATOR)
    }

    /// Entries whose content contains any keyword, case-insensitively, in
    /// storage order.
    pub fn search<S: AsRef<str>>(&self, keywords: &[S]) -> Vec<&ContextEntry> {
        let needles: Vec<String> = keywords.iter().map(|k| k.as_ref().to_lowercase()).collect();
        self.entries
            .iter()
            .filter(|entry| {
                let haystack = entry.content.to_lowercase();
                needles.iter().any(|n| haystack.contains(n.as_str()))
            })
            .collect()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        tracing::info!(removed, "Cleared all context");
    }

    pub fn summary(&self) -> ContextSummary {
        let sources: BTreeSet<&str> = self.entries.iter().map(|e| e.source.as_str()).collect();
        ContextSummary {
            count: self.entries.len(),
            total_words: self.entries.iter().map(|e| e.word_count).sum(),
            sources: sources.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Longest prefix of `s` holding at most `max_chars` characters.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// =============================================================================
// Tests
// =============================================================================
