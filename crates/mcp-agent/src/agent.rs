use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::model::ChatModel;
use crate::types::{Message, Role, ToolCall, ToolOutput};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType, FunctionObjectArgs,
};
use mcp_client::{McpClient, McpError, ToolInfo};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tool-calling agent bound to one model handle and one tool-server client.
///
/// `run` drives a single user turn: up to `max_steps` model calls with tool
/// execution in between, returning the final text answer. With memory enabled
/// the user message and final answer are retained across turns.
pub struct McpAgent {
    model: ChatModel,
    client: Arc<McpClient>,
    config: AgentConfig,
    history: Vec<Message>,
}

impl McpAgent {
    pub fn new(model: ChatModel, client: Arc<McpClient>, config: AgentConfig) -> Self {
        Self {
            model,
            client,
            config,
            history: Vec::new(),
        }
    }

    /// Run one user turn and return the final assistant text.
    pub async fn run(&mut self, input: &str) -> Result<String> {
        // The first turn spawns the configured servers; later turns no-op.
        self.client.create_all_sessions().await;
        let tools = build_openai_tools(&self.client.tools().await)?;

        let mut turn: Vec<Message> = if self.config.memory_enabled {
            self.history.clone()
        } else {
            Vec::new()
        };
        turn.push(Message::user(input));

        let mut steps = 0;
        let answer = loop {
            steps += 1;
            if steps > self.config.max_steps {
                warn!(
                    "Hit max steps ({}), forcing text response",
                    self.config.max_steps
                );
                break "[Agent reached the maximum number of steps]".to_string();
            }
            debug!("Agent step {}", steps);

            let request_messages = self.build_request_messages(&turn)?;
            let response = self.model.complete(request_messages, tools.clone()).await?;
            let content = response.content.unwrap_or_default();

            let tool_calls = response.tool_calls.unwrap_or_default();
            if tool_calls.is_empty() {
                break content;
            }

            let calls: Vec<ToolCall> = tool_calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                })
                .collect();
            turn.push(Message::assistant_with_tool_calls(&content, calls.clone()));

            for call in &calls {
                let output = self.execute_tool_call(call).await?;
                if output.is_error {
                    debug!("Tool '{}' returned an error result", call.name);
                }
                turn.push(Message::tool_result(&output.tool_call_id, &output.content));
            }
        };

        if self.config.memory_enabled {
            self.history.push(Message::user(input));
            self.history.push(Message::assistant(&answer));
        }
        Ok(answer)
    }

    /// Drop all retained conversation history.
    pub fn clear_conversation_history(&mut self) {
        self.history.clear();
    }

    /// Messages retained across turns.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Execute one requested tool call.
    ///
    /// Mistakes the model can correct (unknown tool, malformed arguments,
    /// tool-reported failures) come back as error outputs for the next step;
    /// transport-level failures end the turn.
    async fn execute_tool_call(&self, call: &ToolCall) -> Result<ToolOutput> {
        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                return Ok(ToolOutput {
                    tool_call_id: call.id.clone(),
                    content: format!("Invalid JSON arguments: {}", e),
                    is_error: true,
                })
            }
        };

        match self.client.call_tool(&call.name, args).await {
            Ok(result) => {
                let content = result.text();
                Ok(ToolOutput {
                    tool_call_id: call.id.clone(),
                    content: if result.is_error && content.is_empty() {
                        format!("Tool '{}' failed without output", call.name)
                    } else {
                        content
                    },
                    is_error: result.is_error,
                })
            }
            Err(McpError::ToolNotFound(name)) => Ok(ToolOutput {
                tool_call_id: call.id.clone(),
                content: format!("Tool not found: {}", name),
                is_error: true,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Convert conversation messages to async-openai request messages,
    /// injecting the configured system prompt when none is present.
    fn build_request_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut result = Vec::new();

        let has_system = messages.iter().any(|m| m.role == Role::System);
        if !has_system {
            if let Some(sys_prompt) = &self.config.system_prompt {
                let sys_msg = ChatCompletionRequestSystemMessageArgs::default()
                    .content(sys_prompt.as_str())
                    .build()
                    .map_err(|e| AgentError::Provider(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::System(sys_msg));
            }
        }

        for msg in messages {
            match msg.role {
                Role::System => {
                    let m = ChatCompletionRequestSystemMessageArgs::default()
                        .content(msg.content.as_str())
                        .build()
                        .map_err(|e| AgentError::Provider(e.to_string()))?;
                    result.push(ChatCompletionRequestMessage::System(m));
                }
                Role::User => {
                    let m = ChatCompletionRequestUserMessageArgs::default()
                        .content(msg.content.as_str())
                        .build()
                        .map_err(|e| AgentError::Provider(e.to_string()))?;
                    result.push(ChatCompletionRequestMessage::User(m));
                }
                Role::Assistant => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    builder.content(msg.content.as_str());
                    if let Some(tool_calls) = &msg.tool_calls {
                        let tc_openai: Vec<ChatCompletionMessageToolCall> = tool_calls
                            .iter()
                            .map(|tc| ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: async_openai::types::FunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect();
                        builder.tool_calls(tc_openai);
                    }
                    let m = builder
                        .build()
                        .map_err(|e| AgentError::Provider(e.to_string()))?;
                    result.push(ChatCompletionRequestMessage::Assistant(m));
                }
                Role::Tool => {
                    let m = ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(msg.tool_call_id.as_deref().unwrap_or(""))
                        .content(msg.content.as_str())
                        .build()
                        .map_err(|e| AgentError::Provider(e.to_string()))?;
                    result.push(ChatCompletionRequestMessage::Tool(m));
                }
            }
        }

        Ok(result)
    }
}

/// Convert MCP tool descriptions to OpenAI function-calling tools.
fn build_openai_tools(tools: &[ToolInfo]) -> Result<Vec<ChatCompletionTool>> {
    tools
        .iter()
        .map(|t| {
            let func = FunctionObjectArgs::default()
                .name(&t.name)
                .description(&t.description)
                .parameters(t.input_schema.clone())
                .build()
                .map_err(|e| AgentError::Schema(format!("function '{}': {}", t.name, e)))?;
            ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(func)
                .build()
                .map_err(|e| AgentError::Schema(format!("tool '{}': {}", t.name, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use mcp_client::McpConfig;
    use std::collections::HashMap;

    fn test_agent() -> McpAgent {
        let model = ChatModel::new(ModelConfig {
            api_key: Some("test-key".into()),
            ..ModelConfig::default()
        });
        let client = Arc::new(McpClient::from_config(McpConfig {
            mcp_servers: HashMap::new(),
        }));
        McpAgent::new(model, client, AgentConfig::default())
    }

    #[test]
    fn test_system_prompt_injected_once() {
        let agent = test_agent();

        let built = agent
            .build_request_messages(&[Message::user("hi")])
            .unwrap();
        assert_eq!(built.len(), 2);
        assert!(matches!(built[0], ChatCompletionRequestMessage::System(_)));

        // An explicit system message suppresses the injected one.
        let built = agent
            .build_request_messages(&[Message::system("custom"), Message::user("hi")])
            .unwrap();
        assert_eq!(built.len(), 2);
    }

    #[test]
    fn test_roles_map_to_request_messages() {
        let agent = test_agent();
        let messages = vec![
            Message::system("s"),
            Message::user("u"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "echo".into(),
                    arguments: "{}".into(),
                }],
            ),
            Message::tool_result("call_1", "out"),
            Message::assistant("a"),
        ];
        let built = agent.build_request_messages(&messages).unwrap();
        assert_eq!(built.len(), 5);
        assert!(matches!(built[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(built[3], ChatCompletionRequestMessage::Tool(_)));
    }

    #[test]
    fn test_build_tools_from_mcp_catalog() {
        let tools = vec![ToolInfo {
            name: "get_forecast".into(),
            description: "Get a weather forecast".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let built = build_openai_tools(&tools).unwrap();
        assert_eq!(built.len(), 1);
    }

    #[test]
    fn test_clear_conversation_history() {
        let mut agent = test_agent();
        agent.history.push(Message::user("hello"));
        agent.history.push(Message::assistant("hi"));
        assert_eq!(agent.history().len(), 2);

        agent.clear_conversation_history();
        assert!(agent.history().is_empty());
    }
}
