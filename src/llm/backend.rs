use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ChatRole, MessageType};
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use super::{GenerationRequest, Generator};
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::session::{Turn, TurnRole};

/// Map a provider name to its `llm` backend and API key variable
fn backend_for(provider: &str) -> Option<(LLMBackend, &'static str)> {
    match provider {
        "google" | "gemini" => Some((LLMBackend::Google, "GOOGLE_API_KEY")),
        "anthropic" => Some((LLMBackend::Anthropic, "ANTHROPIC_API_KEY")),
        "openai" => Some((LLMBackend::OpenAI, "OPENAI_API_KEY")),
        _ => None,
    }
}

/// Generation backend using the llm crate
pub struct LlmGenerator {
    backend: LLMBackend,
    provider_name: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl LlmGenerator {
    /// Create a generator for `provider` ("google", "anthropic", "openai").
    ///
    /// The API key is read from the provider's usual environment variable.
    pub fn new(provider: &str, model: impl Into<String>) -> Result<Self, GenerationError> {
        let (backend, key_var) = backend_for(provider)
            .ok_or_else(|| GenerationError::Setup(format!("unknown provider: {}", provider)))?;
        let api_key = std::env::var(key_var)
            .map_err(|_| GenerationError::Setup(format!("{} environment variable not set", key_var)))?;

        let defaults = GenerationConfig::default();
        Ok(Self {
            backend,
            provider_name: provider.to_string(),
            model: model.into(),
            api_key,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            timeout_secs: defaults.timeout_secs,
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        Ok(Self::new(&config.provider, &config.model)?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_timeout_secs(config.timeout_secs))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn build_client(&self, system: &str) -> Result<Box<dyn llm::LLMProvider>, GenerationError> {
        LLMBuilder::new()
            .backend(self.backend.clone())
            .api_key(&self.api_key)
            .model(&self.model)
            .system(system)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()
            .map_err(|e| GenerationError::Setup(e.to_string()))
    }
}

/// Convert a stored turn to the llm crate's ChatMessage format
fn convert_turn(turn: &Turn) -> ChatMessage {
    let role = match turn.role {
        TurnRole::User => ChatRole::User,
        TurnRole::Agent => ChatRole::Assistant,
    };
    ChatMessage {
        role,
        message_type: MessageType::Text,
        content: turn.text.clone(),
    }
}

/// Full message list for a request: history followed by the new prompt
pub(crate) fn chat_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
    let prompt = Turn::user(request.prompt.clone());
    let mut messages: Vec<ChatMessage> = request.history.iter().map(convert_turn).collect();
    messages.push(convert_turn(&prompt));
    messages
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let client = self.build_client(&request.system)?;
        let messages = chat_messages(request);

        debug!(
            provider = %self.provider_name,
            model = %self.model,
            messages = messages.len(),
            "calling generation backend"
        );

        let response = timeout(Duration::from_secs(self.timeout_secs), client.chat(&messages))
            .await
            .map_err(|_| GenerationError::Timeout {
                secs: self.timeout_secs,
            })?
            .map_err(|e| GenerationError::Backend(e.to_string()))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => {
                warn!(provider = %self.provider_name, "generation backend returned no text");
                Err(GenerationError::EmptyResponse)
            }
        }
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}
