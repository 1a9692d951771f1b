//! Shared setup for the commands that talk to the LLM and the MCP server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::assistant::{Assistant, AssistantSettings};
use crate::core::config::Config;
use crate::mcp::client::{McpClient, McpLaunch};

const API_KEY_HINT: &str = "OPENAI_API_KEY is not set.

Set your API key before starting a chat:
export OPENAI_API_KEY=\"your-api-key-here\"

Optionally, point at another OpenAI-compatible endpoint:
export OPENAI_BASE_URL=\"https://api.openai.com/v1\"";

/// Command-line overrides for how the MCP server is launched.
#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub config_path: Option<PathBuf>,
}

/// Decide which process to spawn as the MCP server. Without an explicit
/// command this binary is re-executed as `serve`, forwarding `--config`.
pub fn resolve_launch(
    config: &Config,
    overrides: &LaunchOverrides,
    current_exe: impl FnOnce() -> std::io::Result<PathBuf>,
) -> Result<McpLaunch, String> {
    let env = config.mcp.env.clone();

    if let Some(command) = overrides.command.clone() {
        return Ok(McpLaunch {
            command,
            args: overrides.args.clone(),
            env,
        });
    }
    if let Some(command) = config.mcp.command.clone() {
        let args = if overrides.args.is_empty() {
            config.mcp.args.clone()
        } else {
            overrides.args.clone()
        };
        return Ok(McpLaunch { command, args, env });
    }

    let exe = current_exe().map_err(|err| format!("Cannot locate own executable: {err}"))?;
    let mut args = Vec::new();
    if let Some(path) = &overrides.config_path {
        args.push("--config".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args.push("serve".to_string());
    Ok(McpLaunch {
        command: exe.to_string_lossy().into_owned(),
        args,
        env,
    })
}

pub fn require_api_key(config: &Config) -> Result<String, String> {
    config
        .llm
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| API_KEY_HINT.to_string())
}

/// Spawn and initialize the MCP server.
pub async fn connect_tools(config: &Config, launch: &McpLaunch) -> Result<Arc<McpClient>, String> {
    let timeout = Duration::from_secs(config.mcp.request_timeout_secs.max(1));
    let client = McpClient::connect(launch, timeout).await?;
    let init = client
        .initialize()
        .await
        .map_err(|err| format!("MCP server failed to initialize: {err}"))?;
    debug!(
        server = %init.server_info.name,
        version = %init.server_info.version,
        "Connected to MCP server"
    );
    Ok(Arc::new(client))
}

pub struct Session {
    pub assistant: Assistant,
    pub tools: Arc<McpClient>,
}

/// API key check, MCP connection and assistant, in that order, so a missing
/// key fails before any process is spawned.
pub async fn open_session(
    config: &Config,
    overrides: &LaunchOverrides,
) -> Result<Session, String> {
    let api_key = require_api_key(config)?;
    let launch = resolve_launch(config, overrides, std::env::current_exe)?;
    let tools = connect_tools(config, &launch).await?;
    let settings = AssistantSettings::from_config(&config.llm, api_key);
    let assistant = Assistant::new(settings, tools.clone());
    Ok(Session { assistant, tools })
}
