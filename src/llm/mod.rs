//! LLM integration for the mail agent.
//!
//! Supports:
//! - **OpenAI**: Direct API access via rig-core
//! - **Anthropic**: Direct API access via rig-core
//!
//! The workflow only sees the [`Classifier`] and [`Responder`] traits;
//! [`RigAssistant`] implements both on top of a rig provider client.

pub mod prompts;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::{anthropic, openai};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::error::LlmError;

/// Sampling temperature for both calls. Classification must be stable, and
/// stable answers keep replies reproducible.
const TEMPERATURE: f64 = 0.0;

/// Output budget for a classification label.
const CLASSIFY_MAX_TOKENS: u64 = 16;

/// Output budget for an answer.
const ANSWER_MAX_TOKENS: u64 = 2048;

/// Decides which category a message belongs to.
///
/// Returns the raw label produced by the model. Callers must not trust it:
/// anything other than `code`, `question` or `spam` is treated as spam.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, subject: &str, sender: &str, body_excerpt: &str) -> Result<String, LlmError>;
}

/// Writes a free-text answer to a question-bearing message.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn answer(&self, subject: &str, sender: &str, body: &str) -> Result<String, LlmError>;
}

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Parse a backend name, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    /// Model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn provider_name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Configuration for creating an LLM client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

enum ProviderClient {
    Anthropic(rig::client::Client<anthropic::client::AnthropicExt>),
    OpenAi(rig::client::Client<openai::client::OpenAIResponsesExt>),
}

/// rig-backed classifier and responder.
pub struct RigAssistant {
    client: ProviderClient,
    backend: LlmBackend,
    model: String,
}

impl RigAssistant {
    /// Create the provider client. No request is made until the first call.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = config.backend.provider_name();
        let failed = |e: String| LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: format!("Failed to create client: {e}"),
        };

        let client = match config.backend {
            LlmBackend::Anthropic => ProviderClient::Anthropic(
                anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| failed(e.to_string()))?,
            ),
            LlmBackend::OpenAi => ProviderClient::OpenAi(
                openai::Client::new(config.api_key.expose_secret()).map_err(|e| failed(e.to_string()))?,
            ),
        };

        tracing::info!("Using {} (model: {})", provider, config.model);
        Ok(Self {
            client,
            backend: config.backend,
            model: config.model.clone(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// One-shot completion with a system preamble.
    async fn complete(&self, preamble: &str, prompt: String, max_tokens: u64) -> Result<String, LlmError> {
        let response = match &self.client {
            ProviderClient::Anthropic(client) => {
                let agent = client
                    .agent(&self.model)
                    .preamble(preamble)
                    .temperature(TEMPERATURE)
                    .max_tokens(max_tokens)
                    .build();
                agent.prompt(prompt).await
            }
            ProviderClient::OpenAi(client) => {
                let agent = client
                    .agent(&self.model)
                    .preamble(preamble)
                    .temperature(TEMPERATURE)
                    .max_tokens(max_tokens)
                    .build();
                agent.prompt(prompt).await
            }
        };

        let provider = self.backend.provider_name();
        let text = response.map_err(|e| LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: e.to_string(),
        })?;

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: provider.to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Classifier for RigAssistant {
    async fn classify(&self, subject: &str, sender: &str, body_excerpt: &str) -> Result<String, LlmError> {
        let prompt = prompts::classification_prompt(subject, sender, body_excerpt);
        let label = self
            .complete(prompts::CLASSIFIER_PREAMBLE, prompt, CLASSIFY_MAX_TOKENS)
            .await?;
        debug!(model = %self.model, label = %label.trim(), "Classifier responded");
        Ok(label)
    }
}

#[async_trait]
impl Responder for RigAssistant {
    async fn answer(&self, subject: &str, sender: &str, body: &str) -> Result<String, LlmError> {
        let prompt = prompts::answer_prompt(subject, sender, body);
        let answer = self
            .complete(prompts::RESPONDER_PREAMBLE, prompt, ANSWER_MAX_TOKENS)
            .await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_anthropic_client_without_network() {
        // rig clients accept any string as key at construction time.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-haiku-latest".to_string(),
        };
        let assistant = RigAssistant::new(&config).unwrap();
        assert_eq!(assistant.model_name(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn create_openai_client_without_network() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o-mini".to_string(),
        };
        let assistant = RigAssistant::new(&config).unwrap();
        assert_eq!(assistant.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn backend_parse_is_case_insensitive() {
        assert_eq!(LlmBackend::parse("OpenAI"), Some(LlmBackend::OpenAi));
        assert_eq!(LlmBackend::parse(" anthropic "), Some(LlmBackend::Anthropic));
        assert_eq!(LlmBackend::parse("gemini"), None);
    }
}
