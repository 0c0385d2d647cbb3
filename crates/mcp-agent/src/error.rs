use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Schema build error: {0}")]
    Schema(String),

    #[error("Tool server error: {0}")]
    Mcp(#[from] mcp_client::McpError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
