pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

pub use client::McpClient;
pub use config::{McpConfig, ServerConfig};
pub use error::McpError;
pub use protocol::{CallToolResult, ToolInfo};
pub use session::ServerSession;
