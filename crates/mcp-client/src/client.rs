use crate::config::{McpConfig, ServerConfig};
use crate::error::{McpError, Result};
use crate::protocol::{CallToolResult, ToolInfo};
use crate::session::ServerSession;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Client over the configured set of MCP tool servers.
///
/// Construction only parses configuration; sessions are opened lazily by
/// `create_all_sessions` and torn down in bulk by `close_all_sessions`.
/// Live-session state sits behind a mutex so the client can be shared as
/// `Arc<McpClient>` between the agent and the shutdown path.
pub struct McpClient {
    configs: HashMap<String, ServerConfig>,
    state: Mutex<ClientState>,
}

#[derive(Default)]
struct ClientState {
    sessions: HashMap<String, ServerSession>,
    /// Aggregated catalog across live sessions.
    tools: Vec<ToolInfo>,
    /// Tool name to owning server.
    routes: HashMap<String, String>,
}

impl McpClient {
    /// Build a client from a configuration file. Spawns nothing yet.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_config(McpConfig::from_file(path)?))
    }

    /// Build a client from an already-parsed configuration. Spawns nothing yet.
    pub fn from_config(config: McpConfig) -> Self {
        Self {
            configs: config.mcp_servers,
            state: Mutex::new(ClientState::default()),
        }
    }

    /// Names of all configured servers, live or not.
    pub fn server_names(&self) -> Vec<&str> {
        self.configs.keys().map(|s| s.as_str()).collect()
    }

    /// Whether any live session exists right now.
    pub async fn has_sessions(&self) -> bool {
        !self.state.lock().await.sessions.is_empty()
    }

    /// Open a session to every configured server that does not have one yet.
    ///
    /// Idempotent. A server that fails to start or complete the handshake is
    /// logged and skipped; the others stay usable.
    pub async fn create_all_sessions(&self) {
        let mut state = self.state.lock().await;
        for (name, config) in &self.configs {
            if state.sessions.contains_key(name) {
                continue;
            }
            match Self::open_session(name, config).await {
                Ok((session, tools)) => {
                    for tool in tools {
                        if state.routes.contains_key(&tool.name) {
                            warn!(
                                "Tool '{}' from server '{}' shadows an existing tool, skipping",
                                tool.name, name
                            );
                            continue;
                        }
                        state.routes.insert(tool.name.clone(), name.clone());
                        state.tools.push(tool);
                    }
                    state.sessions.insert(name.clone(), session);
                }
                Err(e) => {
                    warn!("Failed to start MCP server '{}': {}", name, e);
                }
            }
        }
    }

    async fn open_session(
        name: &str,
        config: &ServerConfig,
    ) -> Result<(ServerSession, Vec<ToolInfo>)> {
        let mut session = ServerSession::spawn(name, config)?;
        session.initialize().await?;
        let tools = session.list_tools().await?;
        info!(
            "Connected to MCP server '{}' ({}, {} tools)",
            name,
            session
                .server_info()
                .map(|s| s.name.as_str())
                .unwrap_or("unknown"),
            tools.len()
        );
        Ok((session, tools))
    }

    /// Aggregated tool catalog across all live sessions.
    pub async fn tools(&self) -> Vec<ToolInfo> {
        self.state.lock().await.tools.clone()
    }

    /// Invoke a tool by name, routed to the server that advertised it.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<CallToolResult> {
        let mut state = self.state.lock().await;
        let server = state
            .routes
            .get(tool)
            .cloned()
            .ok_or_else(|| McpError::ToolNotFound(tool.to_string()))?;
        let session = state
            .sessions
            .get_mut(&server)
            .ok_or_else(|| McpError::ServerNotFound(server.clone()))?;
        session.call_tool(tool, arguments).await
    }

    /// Close every live session and await completion.
    ///
    /// Per-session failures are logged; the sweep continues.
    pub async fn close_all_sessions(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        for (name, session) in state.sessions.drain() {
            if let Err(e) = session.close().await {
                warn!("Failed to close session for '{}': {}", name, e);
            }
        }
        state.tools.clear();
        state.routes.clear();
        Ok(())
    }
}
