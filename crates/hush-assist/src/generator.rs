//! Generation contract.
//!
//! The language model is an external collaborator with a single
//! request/response contract: a system instruction and a user prompt go in,
//! one text string comes out.

use async_trait::async_trait;

use hush_core::config::GenerationConfig;

use crate::error::GenerationError;

/// One request to the generation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A backend able to answer a single prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the raw answer text for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// Instruction asking for a terse, whisper-length answer.
pub fn system_instruction(max_words: usize) -> String {
    format!(
        "You're a helpful assistant whispering answers into someone's ear. \
         Give ONLY the direct answer in {} words or less. \
         No explanations, no preamble, no punctuation at the end. \
         Just the essential information, like you're helping a friend cheat on a quiz.",
        max_words
    )
}

/// Build the request for `question`, prefixing at most
/// `config.context_prefix_chars` characters of `context` when it has content.
pub fn build_request(
    question: &str,
    context: &str,
    max_words: usize,
    config: &GenerationConfig,
) -> GenerationRequest {
    let user_prompt = if context.trim().is_empty() {
        question.to_string()
    } else {
        let prefix: String = context.chars().take(config.context_prefix_chars).collect();
        format!("Context: {}\n\nQuestion: {}", prefix, question)
    };

    GenerationRequest {
        system_instruction: system_instruction(max_words),
        user_prompt,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}
