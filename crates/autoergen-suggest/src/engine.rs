use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;

use autoergen_core::Settings;

use crate::GenerateError;

/// What is sent to the text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// A text-generation service. Implementations return non-empty text or fail;
/// they do not retry.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError>;
}

fn map_backend(provider: &str) -> Result<LLMBackend, GenerateError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(GenerateError::UnknownProvider(other.to_string())),
    }
}

/// [`Generator`] backed by the `llm` crate's provider clients.
#[derive(Debug, Clone)]
pub struct LlmGenerator {
    provider: String,
    model: String,
    api_key: String,
}

impl LlmGenerator {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GenerateError> {
        let provider = provider.into();
        map_backend(&provider)?;
        Ok(Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, GenerateError> {
        Self::new(&settings.provider, &settings.model, &settings.api_key)
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError> {
        if !(0.0..=1.0).contains(&request.temperature) {
            return Err(GenerateError::InvalidTemperature(request.temperature));
        }
        let backend = map_backend(&self.provider)?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&self.model)
            .system(&request.system)
            .temperature(request.temperature);

        if !self.api_key.is_empty() {
            builder = builder.api_key(&self.api_key);
        }

        let llm = builder
            .build()
            .map_err(|e| GenerateError::Failed(format!("build LLM: {e}")))?;

        let messages = vec![ChatMessage::user().content(&request.user).build()];

        tracing::debug!(provider = %self.provider, model = %self.model, "sending generation request");
        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| GenerateError::Failed(format!("chat: {e}")))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GenerateError::Empty),
        }
    }
}
