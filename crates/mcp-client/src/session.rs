use crate::config::ServerConfig;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolResult, InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerInfo, ToolInfo, PROTOCOL_VERSION,
};
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// How long to wait for a server to answer a single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a server process to exit after its stdin closes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A live stdio session to one MCP server.
///
/// The transport is newline-delimited JSON-RPC 2.0 over the child process's
/// stdin/stdout. Requests carry monotonically increasing ids; server-initiated
/// frames arriving between a request and its response are skipped.
#[derive(Debug)]
pub struct ServerSession {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    server_info: Option<ServerInfo>,
    initialized: bool,
}

impl ServerSession {
    /// Spawn the server process with piped stdio. No handshake happens yet.
    pub fn spawn(name: &str, config: &ServerConfig) -> Result<Self> {
        debug!(
            "Spawning MCP server '{}': {} {:?}",
            name, config.command, config.args
        );
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Spawn {
                server: name.to_string(),
                message: format!("{}: {}", config.command, e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Protocol {
            server: name.to_string(),
            message: "child stdin unavailable".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Protocol {
            server: name.to_string(),
            message: "child stdout unavailable".into(),
        })?;

        Ok(Self {
            name: name.to_string(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            server_info: None,
            initialized: false,
        })
    }

    /// Perform the MCP handshake. Must complete before any tool traffic.
    pub async fn initialize(&mut self) -> Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.request("initialize", params).await?;
        let init: InitializeResult = serde_json::from_value(result)?;
        debug!(
            "Server '{}' initialized: protocol {}, serving '{}'",
            self.name,
            init.protocol_version,
            init.server_info
                .as_ref()
                .map(|s| s.name.as_str())
                .unwrap_or("unknown")
        );
        self.server_info = init.server_info;

        self.notify("notifications/initialized").await?;
        self.initialized = true;
        Ok(())
    }

    /// Fetch the server's tool catalog.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>> {
        self.ensure_initialized()?;
        let result = self.request("tools/list", json!({})).await?;
        let listed: ListToolsResult = serde_json::from_value(result)?;
        Ok(listed.tools)
    }

    /// Invoke one tool with the given JSON arguments.
    pub async fn call_tool(&mut self, tool: &str, arguments: Value) -> Result<CallToolResult> {
        self.ensure_initialized()?;
        let result = self
            .request("tools/call", json!({ "name": tool, "arguments": arguments }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Shut the server down: close stdin, wait briefly, kill on overrun.
    pub async fn close(mut self) -> Result<()> {
        drop(self.stdin.take());
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!("Server '{}' exited with {}", self.name, status);
            }
            Err(_) => {
                warn!("Server '{}' did not exit after stdin close, killing", self.name);
                self.child.kill().await?;
            }
        }
        Ok(())
    }

    /// Server name this session was spawned under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity the server reported during the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(McpError::Protocol {
                server: self.name.clone(),
                message: "session not initialized".into(),
            })
        }
    }

    /// Send one request and wait for its matching response.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let request = JsonRpcRequest::new(id, method, params);
        self.send(&serde_json::to_string(&request)?).await?;

        tokio::time::timeout(REQUEST_TIMEOUT, self.read_response(id))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.name.clone(),
                method: method.to_string(),
            })?
    }

    /// Read stdout lines until the response with the given id arrives.
    async fn read_response(&mut self, id: u64) -> Result<Value> {
        loop {
            let line = self.stdout.next_line().await?.ok_or_else(|| McpError::Protocol {
                server: self.name.clone(),
                message: "server closed its stdout".into(),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let frame: Value = match serde_json::from_str(&line) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Ignoring unparseable line from '{}': {}", self.name, e);
                    continue;
                }
            };
            // Frames carrying a method are server-initiated, not an answer.
            if frame.get("method").is_some() {
                debug!(
                    "Ignoring server-initiated frame from '{}': {}",
                    self.name,
                    frame.get("method").and_then(|m| m.as_str()).unwrap_or("?")
                );
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(frame)?;
            if response.id != Some(id) {
                warn!(
                    "Skipping response with unexpected id from '{}' (waiting on {})",
                    self.name, id
                );
                continue;
            }
            if let Some(error) = response.error {
                return Err(McpError::Rpc {
                    server: self.name.clone(),
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        let notification = JsonRpcNotification::new(method);
        self.send(&serde_json::to_string(&notification)?).await
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| McpError::Protocol {
            server: self.name.clone(),
            message: "session already closed".into(),
        })?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}
