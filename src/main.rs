mod repl;

use anyhow::{Context, Result};
use mcp_agent::{AgentConfig, ChatModel, McpAgent, ModelConfig};
use mcp_client::McpClient;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Tool-server definitions consumed by the MCP client.
const CONFIG_FILE: &str = "servers.json";

#[tokio::main]
async fn main() -> Result<()> {
    // Set up tracing.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mcp_chat=info,warn".into()),
        ))
        .with_target(false)
        .init();

    // A local .env file may supply the key; a missing file is not an error.
    let _ = dotenvy::dotenv();
    let api_key = std::env::var("GROQ_API_KEY")
        .ok()
        .filter(|key| !key.is_empty())
        .context("GROQ_API_KEY is not set in the environment!")?;

    println!("Initializing chat...");

    let client = Arc::new(McpClient::from_config_file(CONFIG_FILE)?);
    let model = ChatModel::new(ModelConfig {
        model: "llama-3.3-70b-versatile".to_string(),
        api_key: Some(api_key),
        ..ModelConfig::default()
    });
    let agent = McpAgent::new(model, client.clone(), AgentConfig::default());

    repl::run(agent, client.as_ref()).await
}
