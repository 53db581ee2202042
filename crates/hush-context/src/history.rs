//! Rolling conversation history.
//!
//! Keeps the most recent question/answer exchanges, evicting the oldest once
//! the configured cap is reached, and renders recent exchanges as follow-up
//! context for generation.

use std::collections::VecDeque;

use hush_core::types::ConversationExchange;

/// Bounded, ordered log of exchanges. Never holds more than `max_exchanges`.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    exchanges: VecDeque<ConversationExchange>,
    max_exchanges: usize,
}

impl ConversationHistory {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_exchanges),
            max_exchanges,
        }
    }

    pub fn max_exchanges(&self) -> usize {
        self.max_exchanges
    }

    /// Record an exchange, evicting the oldest ones beyond the cap.
    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.exchanges
            .push_back(ConversationExchange::new(question, answer));
        while self.exchanges.len() > self.max_exchanges {
            self.exchanges.pop_front();
        }
    }

    /// The last `k` exchanges, oldest first.
    pub fn recent(&self, k: usize) -> Vec<&ConversationExchange> {
        let skip = self.exchanges.len().saturating_sub(k);
        self.exchanges.iter().skip(skip).collect()
    }

    /// Render the last `k` exchanges as `Q: …\nA: …` blocks joined by a newline.
    pub fn render_recent(&self, k: usize) -> String {
        self.recent(k)
            .iter()
            .map(|ex| format!("Q: {}\nA: {}", ex.question, ex.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All retained exchanges, oldest first.
    pub fn all(&self) -> Vec<ConversationExchange> {
        self.exchanges.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
        tracing::info!("Conversation history cleared");
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(20)
    }
}
