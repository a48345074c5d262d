use crate::llm::config::LlmConfig;
use crate::llm::Llm;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the LLM service
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

/// OpenAI-compatible completion service used by the reasoning phases.
pub struct OpenAiLlm {
    client: Client<OpenAIConfig>,
    config: LlmConfig,
    model_override: Option<String>,
}

impl OpenAiLlm {
    /// Create a new service from configuration
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        config.validate().map_err(LlmError::Config)?;

        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(api_base) = &config.api_base {
            openai_config = openai_config.with_api_base(api_base);
        }

        let client = Client::with_config(openai_config);

        Ok(Self {
            client,
            config,
            model_override: None,
        })
    }

    /// Create a service from environment variables
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env().map_err(LlmError::Config)?;
        Self::new(config)
    }

    /// Pin this service to a specific model, ignoring the configured default.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    fn model(&self) -> &str {
        self.model_override.as_deref().unwrap_or(&self.config.model)
    }
}

#[async_trait]
impl Llm for OpenAiLlm {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map(ChatCompletionRequestMessage::User)
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(self.model())
            .messages(vec![message])
            .max_completion_tokens(max_tokens);

        // Newer models (gpt-4o, gpt-4-turbo, etc.) only accept the default
        // temperature; setting a custom one is rejected.
        let model_lower = self.model().to_lowercase();
        let skip_temperature = model_lower.contains("gpt-4o")
            || model_lower.contains("gpt-4-turbo")
            || model_lower.contains("gpt-5");
        if !skip_temperature {
            request_builder.temperature(temperature);
        }

        let request = request_builder
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;

        tracing::debug!(
            model = self.model(),
            prompt_chars = prompt.len(),
            "sending completion request"
        );

        let response = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.client.chat().create(request),
        )
        .await
        .map_err(|_| {
            tracing::error!(
                "LLM request timed out after {} seconds",
                self.config.timeout_secs
            );
            LlmError::Timeout(self.config.timeout_secs)
        })?
        .map_err(|e| {
            if e.to_string().contains("rate limit") {
                LlmError::RateLimitExceeded
            } else {
                LlmError::Api(e.to_string())
            }
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| {
                LlmError::Parse("No response content - likely hit token limit".to_string())
            })?
            .to_string();

        if content.is_empty() {
            return Err(LlmError::Parse(format!(
                "Empty response from model. Token limit may be too low (current: {})",
                max_tokens
            )));
        }

        tracing::debug!(response_chars = content.len(), "received completion");

        Ok(content)
    }
}
