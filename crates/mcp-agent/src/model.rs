use crate::config::ModelConfig;
use crate::error::{AgentError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionResponseMessage, ChatCompletionTool,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use tracing::debug;

/// Handle to one hosted chat model behind an OpenAI-compatible API.
pub struct ChatModel {
    client: Client<OpenAIConfig>,
    config: ModelConfig,
}

impl ChatModel {
    /// Build the handle. No network traffic happens until `complete`.
    pub fn new(config: ModelConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_base(&config.api_base)
            .with_api_key(
                config
                    .api_key
                    .clone()
                    .unwrap_or_else(|| "not-needed".to_string()),
            );
        let client = Client::with_config(openai_config);
        Self { client, config }
    }

    /// Model identifier this handle calls.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One chat-completions call; returns the first choice's message.
    pub async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<ChatCompletionResponseMessage> {
        debug!(
            "Requesting completion from {} ({} messages, {} tools)",
            self.config.model,
            messages.len(),
            tools.len()
        );

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(&self.config.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_completion_tokens(self.config.max_tokens);
        if !tools.is_empty() {
            request_builder.tools(tools);
        }
        let request = request_builder
            .build()
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;
        Ok(choice.message)
    }
}
