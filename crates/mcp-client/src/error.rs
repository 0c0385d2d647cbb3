use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to launch server '{server}': {message}")]
    Spawn { server: String, message: String },

    #[error("Server not configured: {0}")]
    ServerNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Protocol error from '{server}': {message}")]
    Protocol { server: String, message: String },

    #[error("Server '{server}' returned error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("Timed out waiting for '{server}' to answer '{method}'")]
    Timeout { server: String, method: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, McpError>;
