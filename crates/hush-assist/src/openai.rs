//! OpenAI-compatible chat completions backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use hush_core::config::GenerationConfig;

use crate::error::GenerationError;
use crate::generator::{GenerationRequest, Generator};

/// Longest error body kept in a [`GenerationError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 320;

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

/// Generator backed by a `/v1/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiGenerator {
    /// Build a generator from config. Fails when no API key is available.
    ///
    /// The HTTP client timeout is a backstop; the orchestrator applies the
    /// response timeout around each call.
    pub fn new(config: &GenerationConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::Unconfigured("missing API key".to_string()))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn payload(&self, request: &GenerationRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_instruction },
                { "role": "user", "content": request.user_prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        extract_answer(completion)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn extract_answer(completion: ChatCompletion) -> Result<String, GenerationError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("response did not include choices".to_string()))?;

    let answer = choice.message.content.unwrap_or_default().trim().to_string();
    if answer.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(answer)
}
