use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HushError, Result};

/// Top-level configuration for the Hush assistant.
///
/// Loaded from `~/.hush/config.toml` by default. Every section falls back to
/// its defaults when omitted, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HushConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl HushConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HushConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(HushError::Config(format!(
                "detection.confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.response.max_response_words == 0 {
            return Err(HushError::Config(
                "response.max_response_words must be greater than 0".to_string(),
            ));
        }
        if self.response.response_timeout_secs == 0 {
            return Err(HushError::Config(
                "response.response_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.context.max_entry_chars == 0 {
            return Err(HushError::Config(
                "context.max_entry_chars must be greater than 0".to_string(),
            ));
        }
        if self.history.max_exchanges == 0 {
            return Err(HushError::Config(
                "history.max_exchanges must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:8501".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

/// Respond-gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum classifier confidence required before answering.
    pub confidence_threshold: f64,
    /// Minimum whitespace token count of a fragment before answering.
    pub min_question_length: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            min_question_length: 3,
        }
    }
}

/// Answer generation and delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Hard cap on spoken answer length, in words.
    pub max_response_words: usize,
    /// Upper bound on a single generation call.
    pub response_timeout_secs: u64,
    /// Character budget for uploaded context per answer.
    pub context_window_chars: usize,
    /// Number of prior exchanges fed back as follow-up context.
    pub history_window: usize,
    /// Answer substituted when generation fails.
    pub fallback_answer: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_response_words: 15,
            response_timeout_secs: 5,
            context_window_chars: 500,
            history_window: 5,
            fallback_answer: "Sorry couldn't get that".to_string(),
        }
    }
}

/// Context store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Per-entry character cap, applied at insertion.
    pub max_entry_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_entry_chars: 2000,
        }
    }
}

/// Conversation history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum retained exchanges; oldest are evicted first.
    pub max_exchanges: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_exchanges: 20 }
    }
}

/// OpenAI-compatible generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    /// API key. `OPENAI_API_KEY` in the environment takes precedence.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Maximum characters of context prefixed to the question in the prompt.
    pub context_prefix_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
            max_tokens: 30,
            temperature: 0.3,
            context_prefix_chars: 200,
        }
    }
}
