/// Groq's OpenAI-compatible endpoint.
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Connection details for the hosted model endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL for the OpenAI-compatible API.
    pub api_base: String,
    /// Model name (e.g. "llama-3.3-70b-versatile").
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: GROQ_API_BASE.into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Behavior knobs for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum internal model/tool steps per user turn.
    pub max_steps: usize,
    /// Retain conversation history across turns.
    pub memory_enabled: bool,
    /// System prompt injected when the conversation does not carry one.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            memory_enabled: true,
            system_prompt: Some(
                "You are a helpful assistant with access to tools. \
                 Use tools when they help answer the user."
                    .into(),
            ),
        }
    }
}
