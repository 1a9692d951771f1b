//! Newline-delimited JSON-RPC MCP server over a pair of byte streams.
//!
//! Requests are dispatched onto their own tasks so one slow NSO call never
//! holds up `ping` or other in-flight requests. Every response goes through a
//! single writer task, which keeps output lines whole.

use std::sync::Arc;

use rust_mcp_schema::{
    GetPromptResult, Implementation, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, Prompt, PromptMessage, ReadResourceResult, Resource, Role,
    ServerCapabilities, ServerCapabilitiesPrompts, ServerCapabilitiesResources,
    ServerCapabilitiesTools, TextContent, TextResourceContents,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::prompts::default_nso_prompt;
use crate::mcp::tools::{NsoTools, UnknownTool};

pub mod protocol;

use protocol::{
    error_response, negotiate_protocol_version, parse_params, success_response, to_result,
    CallToolParams, GetPromptParams, InitializeParams, ReadResourceParams, RpcFailure, RpcRequest,
    INVALID_REQUEST, PARSE_ERROR, RESOURCE_NOT_FOUND,
};

pub const SERVER_NAME: &str = "nso-mcp";
pub const ENVIRONMENT_RESOURCE_URI: &str = "https://resources.cisco-nso-mcp.io/environment";
pub const DEFAULT_PROMPT_NAME: &str = "nso-default";

const SERVER_INSTRUCTIONS: &str =
    "Read-only access to Cisco NSO: list NED IDs and inspect device platforms and configuration.";
const JSON_MIME: &str = "application/json";

type ResponseSender = mpsc::UnboundedSender<Value>;

pub struct McpServer {
    tools: NsoTools,
}

impl McpServer {
    pub fn new(tools: NsoTools) -> Self {
        Self { tools }
    }

    /// Serve until `reader` reaches EOF, then wait for in-flight responses to
    /// be written. A read failure still drains the writer before it is
    /// returned.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let read_result = loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break Ok(()),
                Ok(_) => self.dispatch_line(&line, &tx),
                Err(err) => {
                    warn!(error = %err, "Reading MCP input failed");
                    break Err(err);
                }
            }
        };

        debug!("Input closed; draining responses");
        drop(tx);
        let write_result = writer_task.await.map_err(std::io::Error::other)?;
        read_result.and(write_result)
    }

    fn dispatch_line(self: &Arc<Self>, line: &[u8], tx: &ResponseSender) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        let value = match serde_json::from_slice::<Value>(line) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Unparsable JSON-RPC line");
                let failure = RpcFailure::new(PARSE_ERROR, format!("Parse error: {err}"));
                let _ = tx.send(error_response(Value::Null, &failure));
                return;
            }
        };

        let request = match serde_json::from_value::<RpcRequest>(value.clone()) {
            Ok(request) if request.jsonrpc == "2.0" => request,
            _ => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                let failure = RpcFailure::new(INVALID_REQUEST, "Invalid Request");
                let _ = tx.send(error_response(id, &failure));
                return;
            }
        };

        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return;
        }

        let server = Arc::clone(self);
        let tx = tx.clone();
        tokio::spawn(async move {
            let id = request.id.unwrap_or(Value::Null);
            let response = match server.handle(&request.method, request.params).await {
                Ok(result) => success_response(id, result),
                Err(failure) => {
                    debug!(method = %request.method, code = failure.code, message = %failure.message, "Request failed");
                    error_response(id, &failure)
                }
            };
            let _ = tx.send(response);
        });
    }

    pub async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, RpcFailure> {
        match method {
            "initialize" => {
                let params: InitializeParams = parse_params(params)?;
                let version = negotiate_protocol_version(params.protocol_version.as_deref());
                info!(
                    protocol_version = version,
                    client = ?params.client_info,
                    "Client initialized"
                );
                to_result(&initialize_result(version))
            }
            "ping" => Ok(json!({})),
            "tools/list" => to_result(&ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: self.tools.specs().iter().map(|spec| spec.to_tool()).collect(),
            }),
            "tools/call" => {
                let params: CallToolParams = parse_params(params)?;
                let outcome = self
                    .tools
                    .call(&params.name, params.arguments)
                    .await
                    .map_err(|UnknownTool(name)| {
                        RpcFailure::invalid_params(format!("Unknown tool: {name}"))
                    })?;
                to_result(&outcome.into_call_result())
            }
            "resources/list" => to_result(&ListResourcesResult {
                meta: None,
                next_cursor: None,
                resources: vec![environment_resource()],
            }),
            "resources/read" => {
                let params: ReadResourceParams = parse_params(params)?;
                if params.uri != ENVIRONMENT_RESOURCE_URI {
                    return Err(RpcFailure::new(
                        RESOURCE_NOT_FOUND,
                        format!("Resource not found: {}", params.uri),
                    ));
                }
                let summary = self.tools.environment_summary().await;
                to_result(&ReadResourceResult {
                    contents: vec![TextResourceContents {
                        meta: None,
                        mime_type: Some(JSON_MIME.to_string()),
                        text: pretty(&summary.envelope),
                        uri: ENVIRONMENT_RESOURCE_URI.to_string(),
                    }
                    .into()],
                    meta: None,
                })
            }
            "prompts/list" => to_result(&ListPromptsResult {
                meta: None,
                next_cursor: None,
                prompts: vec![Prompt {
                    arguments: Vec::new(),
                    description: Some(
                        "Network assistant guidance with the current NSO environment".to_string(),
                    ),
                    icons: Vec::new(),
                    meta: None,
                    name: DEFAULT_PROMPT_NAME.to_string(),
                    title: None,
                }],
            }),
            "prompts/get" => {
                let params: GetPromptParams = parse_params(params)?;
                if params.name != DEFAULT_PROMPT_NAME {
                    return Err(RpcFailure::invalid_params(format!(
                        "Unknown prompt: {}",
                        params.name
                    )));
                }
                let summary = self.tools.environment_summary().await;
                let environment = (!summary.is_error).then(|| pretty(&summary.envelope["data"]));
                let text = default_nso_prompt(environment.as_deref());
                to_result(&GetPromptResult {
                    description: Some("Default prompt for Cisco NSO".to_string()),
                    messages: vec![PromptMessage {
                        content: TextContent::new(text, None, None).into(),
                        role: Role::User,
                    }],
                    meta: None,
                })
            }
            other => Err(RpcFailure::method_not_found(other)),
        }
    }
}

fn initialize_result(protocol_version: &str) -> InitializeResult {
    InitializeResult {
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: Some(ServerCapabilitiesResources {
                list_changed: Some(false),
                subscribe: Some(false),
            }),
            prompts: Some(ServerCapabilitiesPrompts {
                list_changed: Some(false),
            }),
            ..ServerCapabilities::default()
        },
        instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        meta: None,
        protocol_version: protocol_version.to_string(),
        server_info: Implementation {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Cisco NSO MCP Server".to_string()),
            description: None,
            icons: Vec::new(),
            website_url: None,
        },
    }
}

fn environment_resource() -> Resource {
    Resource {
        annotations: None,
        description: Some("NSO environment summary".to_string()),
        icons: Vec::new(),
        meta: None,
        mime_type: Some(JSON_MIME.to_string()),
        name: "environment".to_string(),
        size: None,
        title: None,
        uri: ENVIRONMENT_RESOURCE_URI.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = response.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
