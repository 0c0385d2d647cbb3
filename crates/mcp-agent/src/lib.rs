//! Tool-calling agent for MCP servers.
//!
//! Wraps a chat-completion model and an [`mcp_client::McpClient`], looping
//! between model inference and tool execution until the model produces a
//! plain text answer.

pub mod agent;
pub mod config;
pub mod error;
pub mod model;
pub mod types;

pub use agent::McpAgent;
pub use config::{AgentConfig, ModelConfig};
pub use error::AgentError;
pub use model::ChatModel;
pub use types::{Message, Role, ToolCall, ToolOutput};
