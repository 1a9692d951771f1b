//! Stdio MCP client: spawns a server process and talks JSON-RPC over its
//! stdin/stdout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, Implementation,
    InitializeRequestParams, InitializeResult, PaginatedRequestParams, RequestId, Tool,
    LATEST_PROTOCOL_VERSION,
};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

mod protocol;

pub use protocol::tool_result_text;
use protocol::{parse_call_tool, parse_initialize_result, parse_list_tools};

const MCP_MAX_TOOL_LIST: usize = 100;
const STDIO_WRITE_TIMEOUT_SECONDS: u64 = 10;
const CONNECTION_CLOSED: &str = "MCP server connection closed.";

type PendingRequests = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Tool source the assistant drives. [`McpClient`] is the real one.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<Tool>, String>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, String>;
}

/// How to start the MCP server process.
#[derive(Debug, Clone, PartialEq)]
pub struct McpLaunch {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

pub struct McpClient {
    stdin: Mutex<BoxedWriter>,
    pending: PendingRequests,
    closed: Arc<AtomicBool>,
    next_request_id: AtomicI64,
    request_timeout: Duration,
    child: Mutex<Option<Child>>,
}

impl McpClient {
    /// Spawn the server described by `launch`. The process is killed when the
    /// client is dropped.
    pub async fn connect(launch: &McpLaunch, request_timeout: Duration) -> Result<Self, String> {
        debug!(command = %launch.command, args = ?launch.args, "Starting MCP stdio server");
        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| format!("Failed to start MCP server '{}': {err}", launch.command))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "Unable to retrieve stdin.".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Unable to retrieve stdout.".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Unable to retrieve stderr.".to_string())?;

        Self::spawn_stderr_drain(stderr);
        let client = Self::from_streams(stdout, stdin, request_timeout);
        *client.child.lock().await = Some(child);
        Ok(client)
    }

    /// Client over an already-connected pair of streams.
    pub fn from_streams<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        Self::spawn_stdout_reader(pending.clone(), closed.clone(), reader);
        Self {
            stdin: Mutex::new(Box::new(writer)),
            pending,
            closed,
            next_request_id: AtomicI64::new(0),
            request_timeout,
            child: Mutex::new(None),
        }
    }

    fn spawn_stdout_reader<R>(pending: PendingRequests, closed: Arc<AtomicBool>, stdout: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ServerMessage>(line) {
                    Ok(message) => Self::dispatch_message(&pending, message).await,
                    Err(err) => warn!(error = %err, "Ignoring unparsable MCP server output"),
                }
            }
            debug!("MCP server output closed");
            closed.store(true, Ordering::SeqCst);
            pending.lock().await.clear();
        });
    }

    fn spawn_stderr_drain<R>(stderr: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(target: "mcp_server", "{line}");
            }
        });
    }

    async fn dispatch_message(pending: &PendingRequests, message: ServerMessage) {
        match &message {
            ServerMessage::Response(response) => {
                debug!(response_id = ?response.id, "Received MCP stdio response");
                if let Some(tx) = pending.lock().await.remove(&response.id) {
                    let _ = tx.send(message);
                }
            }
            ServerMessage::Error(error) => {
                debug!(
                    error_id = ?error.id,
                    error_code = error.error.code,
                    "Received MCP stdio error"
                );
                match error.id.as_ref() {
                    Some(id) => {
                        if let Some(tx) = pending.lock().await.remove(id) {
                            let _ = tx.send(message);
                        }
                    }
                    None => warn!(message = %error.error.message, "MCP server reported an error"),
                }
            }
            ServerMessage::Request(request) => {
                warn!(method = %request.method(), "Ignoring MCP server request");
            }
            ServerMessage::Notification(_) => {
                debug!("Received MCP stdio notification");
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        RequestId::Integer(id)
    }

    async fn write_message(&self, message: &ClientMessage) -> Result<(), String> {
        let mut payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
        payload.push('\n');
        let write_timeout = Duration::from_secs(STDIO_WRITE_TIMEOUT_SECONDS);
        let mut stdin = self.stdin.lock().await;
        tokio::time::timeout(write_timeout, async {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.flush().await
        })
        .await
        .map_err(|_| "Timed out writing MCP stdio message.".to_string())?
        .map_err(|err| err.to_string())
    }

    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id();
        debug!(request_id = ?request_id, "Sending MCP stdio request");
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| err.to_string())?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&request_id);
            return Err(CONNECTION_CLOSED.to_string());
        }

        if let Err(err) = self.write_message(&message).await {
            self.pending.lock().await.remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(CONNECTION_CLOSED.to_string()),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                debug!(request_id = ?request_id, timeout_secs = self.request_timeout.as_secs(), "MCP stdio request timed out");
                Err("MCP stdio request timed out.".to_string())
            }
        }
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        self.write_message(&message).await
    }

    /// Run the initialize handshake and send `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult, String> {
        let response = self
            .send_request(RequestFromClient::InitializeRequest(client_details()))
            .await?;
        let result = parse_initialize_result(response)?;
        debug!(
            server = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP server initialized"
        );
        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        Ok(result)
    }

    pub async fn ping(&self) -> Result<(), String> {
        let response = self
            .send_request(RequestFromClient::PingRequest(None))
            .await?;
        protocol::parse_response_value(response).map(|_| ())
    }

    /// All advertised tools, following `nextCursor` until exhausted.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, String> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|cursor| PaginatedRequestParams {
                cursor: Some(cursor),
                meta: None,
            });
            let response = self
                .send_request(RequestFromClient::ListToolsRequest(params))
                .await?;
            let mut page = parse_list_tools(response)?;
            tools.append(&mut page.tools);
            if tools.len() >= MCP_MAX_TOOL_LIST {
                tools.truncate(MCP_MAX_TOOL_LIST);
                break;
            }
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, String> {
        let mut params = CallToolRequestParams::new(name);
        if let Some(arguments) = arguments {
            params = params.with_arguments(arguments);
        }
        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        parse_call_tool(response)
    }

    /// Stop the server process, if this client spawned one.
    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(error = %err, "MCP server already exited");
            }
        }
    }
}

#[async_trait]
impl ToolBackend for McpClient {
    async fn list_tools(&self) -> Result<Vec<Tool>, String> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, String> {
        McpClient::call_tool(self, name, arguments).await
    }
}

fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "nso-chat".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("NSO Chat".to_string()),
            description: Some("Chat client for Cisco NSO tools".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}
