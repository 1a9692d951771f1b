use std::collections::BTreeMap;

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{
    ChatMessage, ChatRequest, ChatResponse, ChatToolCall, ChatToolCallFunction,
    ChatToolDefinition,
};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    Chunk(String),
    ToolCallDelta(ToolCallDelta),
    Error(String),
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(StreamMessage::End);
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.into_iter().next() {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        let _ = tx.send(StreamMessage::Chunk(content));
                    }
                }
                for delta in choice.delta.tool_calls.unwrap_or_default() {
                    let (name, arguments) = match delta.function {
                        Some(function) => (function.name, function.arguments),
                        None => (None, None),
                    };
                    let _ = tx.send(StreamMessage::ToolCallDelta(ToolCallDelta {
                        index: delta.index.unwrap_or(0),
                        id: delta.id,
                        name,
                        arguments,
                    }));
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            let formatted_error = format_api_error(payload);
            let _ = tx.send(StreamMessage::Error(formatted_error));
            let _ = tx.send(StreamMessage::End);
            true
        }
    }
}

fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx))
        .unwrap_or(false)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return match extract_error_summary(&json_value) {
                Some(summary) if !summary.is_empty() => {
                    format!("API Error: {summary}\n```json\n{pretty_json}\n```")
                }
                _ => format!("API Error:\n```json\n{pretty_json}\n```"),
            };
        }
    }

    format!("API Error:\n```\n{trimmed}\n```")
}

/// Merges streamed tool-call fragments by index: ids and names replace,
/// argument fragments concatenate.
#[derive(Debug, Default)]
pub struct PendingToolCalls {
    calls: BTreeMap<u32, PendingToolCall>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PendingToolCalls {
    pub fn append(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if delta.id.is_some() {
            entry.id = delta.id;
        }
        if delta.name.is_some() {
            entry.name = delta.name;
        }
        if let Some(arguments) = delta.arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in index order. Fragments that never received a
    /// function name cannot be executed and are dropped.
    pub fn into_calls(self) -> Vec<ChatToolCall> {
        self.calls
            .into_iter()
            .filter_map(|(index, call)| {
                let Some(name) = call.name.filter(|name| !name.trim().is_empty()) else {
                    warn!(index, "Dropping streamed tool call without a function name");
                    return None;
                };
                Some(ChatToolCall {
                    id: call.id.unwrap_or_else(|| format!("call_{index}")),
                    kind: "function".to_string(),
                    function: ChatToolCallFunction {
                        name,
                        arguments: call.arguments,
                    },
                })
            })
            .collect()
    }
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub tools: Option<Vec<ChatToolDefinition>>,
    pub cancel_token: CancellationToken,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                model,
                api_messages,
                tools,
                cancel_token,
            } = params;

            let request = ChatRequest {
                model,
                messages: api_messages,
                stream: true,
                tools,
            };

            tokio::select! {
                _ = run_stream(&client, &base_url, &api_key, &request, &tx, &cancel_token) => {}
                _ = cancel_token.cancelled() => {
                    debug!("Chat stream cancelled");
                    let _ = tx.send(StreamMessage::End);
                }
            }
        });
    }
}

async fn run_stream(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: &ChatRequest,
    tx: &mpsc::UnboundedSender<StreamMessage>,
    cancel_token: &CancellationToken,
) {
    let chat_url = construct_api_url(base_url, "chat/completions");
    debug!(url = %chat_url, model = %request.model, tools = request.tools.as_ref().map_or(0, Vec::len), "Starting chat completion stream");

    let mut http_request = client
        .post(chat_url)
        .header("Content-Type", "application/json");
    if !api_key.is_empty() {
        http_request = http_request.bearer_auth(api_key);
    }

    let response = match http_request.json(request).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(StreamMessage::Error(format_api_error(&e.to_string())));
            let _ = tx.send(StreamMessage::End);
            return;
        }
    };

    if !response.status().is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx.send(StreamMessage::Error(format_api_error(&error_text)));
        let _ = tx.send(StreamMessage::End);
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        if cancel_token.is_cancelled() {
            return;
        }

        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(StreamMessage::Error(format_api_error(&e.to_string())));
                let _ = tx.send(StreamMessage::End);
                return;
            }
        };
        buffer.extend_from_slice(&chunk_bytes);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let should_end = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(line) => process_sse_line(line.trim(), tx),
                Err(e) => {
                    warn!(error = %e, "Invalid UTF-8 in chat stream");
                    false
                }
            };
            buffer.drain(..=newline_pos);
            if should_end {
                return;
            }
        }
    }

    if let Ok(rest) = std::str::from_utf8(&buffer) {
        if process_sse_line(rest.trim(), tx) {
            return;
        }
    }
    let _ = tx.send(StreamMessage::End);
}
