//! In-memory stores feeding answer generation.
//!
//! The context store holds user-uploaded reference material and selects a
//! recency window of it under a character budget. The conversation history
//! keeps a bounded log of prior question/answer exchanges for follow-ups.

pub mod history;
pub mod store;

pub use history::ConversationHistory;
pub use store::ContextStore;
