//! Conversation driver: streams completions, runs requested tools over MCP and
//! feeds their results back until the model answers in plain text.

use std::sync::Arc;

use rust_mcp_schema::Tool;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ChatMessage, ChatToolCall, ChatToolDefinition};
use crate::core::chat_stream::{ChatStreamService, PendingToolCalls, StreamMessage, StreamParams};
use crate::core::config::data::LlmConfig;
use crate::core::prompts::NETWORK_ASSISTANT_PROMPT;
use crate::mcp::client::{tool_result_text, ToolBackend};

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tool_rounds: usize,
    pub system_prompt: String,
}

impl AssistantSettings {
    pub fn from_config(llm: &LlmConfig, api_key: String) -> Self {
        Self {
            base_url: llm.base_url.clone(),
            api_key,
            model: llm.model.clone(),
            max_tool_rounds: llm.max_tool_rounds,
            system_prompt: llm
                .system_prompt
                .clone()
                .unwrap_or_else(|| NETWORK_ASSISTANT_PROMPT.to_string()),
        }
    }
}

pub struct Assistant {
    http: reqwest::Client,
    settings: AssistantSettings,
    tools: Arc<dyn ToolBackend>,
    history: Vec<ChatMessage>,
}

/// What one streamed completion produced.
struct StreamTurn {
    content: String,
    tool_calls: Vec<ChatToolCall>,
}

impl Assistant {
    pub fn new(settings: AssistantSettings, tools: Arc<dyn ToolBackend>) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            tools,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Answer `query`, calling `on_chunk` with every streamed text fragment.
    ///
    /// History is kept across calls. A failed or cancelled query leaves the
    /// history as it was before the call.
    pub async fn process_query<F>(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<String, String>
    where
        F: FnMut(&str),
    {
        let checkpoint = self.history.len();
        let result = self.run_query(query, cancel, &mut on_chunk).await;
        if result.is_err() {
            self.history.truncate(checkpoint);
        }
        result
    }

    async fn run_query<F>(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
        on_chunk: &mut F,
    ) -> Result<String, String>
    where
        F: FnMut(&str),
    {
        if self.history.is_empty() {
            self.history
                .push(ChatMessage::system(self.settings.system_prompt.clone()));
        }
        self.history.push(ChatMessage::user(query));

        let tools = self
            .tools
            .list_tools()
            .await
            .map_err(|err| format!("Failed to list MCP tools: {err}"))?;
        let definitions: Vec<ChatToolDefinition> = tools.iter().map(tool_definition).collect();
        debug!(tools = definitions.len(), "Tools available for query");

        let mut round = 0;
        loop {
            let offer_tools = round < self.settings.max_tool_rounds && !definitions.is_empty();
            let turn = self
                .stream_turn(offer_tools.then(|| definitions.clone()), cancel, on_chunk)
                .await?;

            if turn.tool_calls.is_empty() || !offer_tools {
                if !turn.tool_calls.is_empty() {
                    warn!(
                        calls = turn.tool_calls.len(),
                        "Ignoring tool calls after the last tool round"
                    );
                }
                if turn.content.is_empty() {
                    warn!("No streaming content received");
                }
                self.history.push(ChatMessage::assistant(turn.content.clone()));
                return Ok(turn.content);
            }

            self.history.push(ChatMessage::assistant_tool_calls(
                Some(turn.content),
                turn.tool_calls.clone(),
            ));
            for call in &turn.tool_calls {
                let output = self.run_tool(call).await;
                self.history
                    .push(ChatMessage::tool_result(call.id.clone(), output));
            }
            round += 1;
        }
    }

    async fn stream_turn<F>(
        &self,
        tools: Option<Vec<ChatToolDefinition>>,
        cancel: &CancellationToken,
        on_chunk: &mut F,
    ) -> Result<StreamTurn, String>
    where
        F: FnMut(&str),
    {
        let (service, rx) = ChatStreamService::new();
        service.spawn_stream(StreamParams {
            client: self.http.clone(),
            base_url: self.settings.base_url.clone(),
            api_key: self.settings.api_key.clone(),
            model: self.settings.model.clone(),
            api_messages: self.history.clone(),
            tools,
            cancel_token: cancel.clone(),
        });
        // The stream task owns the only sender from here on.
        drop(service);
        collect_turn(rx, cancel, on_chunk).await
    }

    async fn run_tool(&self, call: &ChatToolCall) -> String {
        let name = &call.function.name;
        let arguments = parse_tool_arguments(&call.function.arguments);
        let shown = Value::Object(arguments.clone());
        info!(tool = %name, arguments = %shown, "Calling tool");
        match self.tools.call_tool(name, Some(arguments)).await {
            Ok(result) => tool_result_text(&result),
            Err(err) => {
                warn!(tool = %name, error = %err, "Tool call failed");
                json!({"status": "error", "error_message": err}).to_string()
            }
        }
    }
}

/// Drain one stream until `End` or until every sender is gone.
async fn collect_turn<F>(
    mut rx: mpsc::UnboundedReceiver<StreamMessage>,
    cancel: &CancellationToken,
    on_chunk: &mut F,
) -> Result<StreamTurn, String>
where
    F: FnMut(&str),
{
    let mut content = String::new();
    let mut pending = PendingToolCalls::default();
    let mut error = None;
    while let Some(message) = rx.recv().await {
        match message {
            StreamMessage::Chunk(text) => {
                on_chunk(&text);
                content.push_str(&text);
            }
            StreamMessage::ToolCallDelta(delta) => pending.append(delta),
            StreamMessage::Error(message) => error = Some(message),
            StreamMessage::End => break,
        }
    }

    if cancel.is_cancelled() {
        return Err("Request cancelled.".to_string());
    }
    if let Some(error) = error {
        return Err(error);
    }
    Ok(StreamTurn {
        content,
        tool_calls: if pending.is_empty() {
            Vec::new()
        } else {
            pending.into_calls()
        },
    })
}

/// Argument strings that are empty or not a JSON object become `{}`.
pub fn parse_tool_arguments(raw: &str) -> Map<String, Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(arguments = %other, "Tool arguments are not an object");
            Map::new()
        }
        Err(err) => {
            warn!(error = %err, "Invalid tool arguments");
            Map::new()
        }
    }
}

/// Function definition for an MCP tool. Schemas missing `type` or
/// `properties` are completed so strict providers accept them.
pub fn tool_definition(tool: &Tool) -> ChatToolDefinition {
    let mut parameters = match serde_json::to_value(&tool.input_schema) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    parameters
        .entry("type")
        .or_insert_with(|| Value::String("object".to_string()));
    parameters
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    ChatToolDefinition::function(
        tool.name.clone(),
        tool.description.clone(),
        Value::Object(parameters),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_mcp_schema::CallToolResult;
    use std::sync::Mutex;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<(String, Value)>>,
        fail_calls: bool,
    }

    #[async_trait]
    impl ToolBackend for FakeBackend {
        async fn list_tools(&self) -> Result<Vec<Tool>, String> {
            let tool = serde_json::from_value(json!({
                "name": "get_device_platform",
                "description": "Retrieve platform information",
                "inputSchema": {
                    "type": "object",
                    "properties": {"device_name": {"type": "string"}},
                    "required": ["device_name"]
                }
            }))
            .map_err(|err| err.to_string())?;
            Ok(vec![tool])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Option<Map<String, Value>>,
        ) -> Result<CallToolResult, String> {
            self.calls.lock().expect("calls").push((
                name.to_string(),
                Value::Object(arguments.unwrap_or_default()),
            ));
            if self.fail_calls {
                return Err("MCP stdio request timed out.".to_string());
            }
            serde_json::from_value(json!({
                "content": [{"type": "text", "text": "{\"status\":\"success\",\"data\":{\"device_platform\":{\"name\":\"ios\"}}}"}],
                "isError": false
            }))
            .map_err(|err| err.to_string())
        }
    }

    fn sse(events: &[Value]) -> String {
        let mut body = String::new();
        for event in events {
            body.push_str(&format!("data: {event}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn text_stream(text: &str) -> String {
        sse(&[json!({"choices": [{"delta": {"content": text}}]})])
    }

    fn tool_call_stream() -> String {
        sse(&[
            json!({"choices": [{"delta": {"tool_calls": [{
                "index": 0, "id": "call_1", "type": "function",
                "function": {"name": "get_device_platform", "arguments": "{\"device_"}
            }]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{
                "index": 0,
                "function": {"arguments": "name\":\"ios-0\"}"}
            }]}}]}),
        ])
    }

    fn settings(server: &MockServer, max_tool_rounds: usize) -> AssistantSettings {
        AssistantSettings {
            base_url: server.uri(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o".to_string(),
            max_tool_rounds,
            system_prompt: NETWORK_ASSISTANT_PROMPT.to_string(),
        }
    }

    async fn mount_stream(server: &MockServer, body: String, times: Option<u64>, marker: Option<&str>) {
        let mut mock = Mock::given(method("POST")).and(path("/chat/completions"));
        if let Some(marker) = marker {
            mock = mock.and(body_string_contains(marker));
        }
        let mut builder =
            mock.respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"));
        if let Some(times) = times {
            builder = builder.up_to_n_times(times);
        }
        builder.mount(server).await;
    }

    async fn request_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .expect("recording enabled")
            .iter()
            .map(|request| serde_json::from_slice(&request.body).expect("json body"))
            .collect()
    }

    #[test]
    fn tool_arguments_fall_back_to_empty_object() {
        assert!(parse_tool_arguments("").is_empty());
        assert!(parse_tool_arguments("{not json").is_empty());
        assert!(parse_tool_arguments("[1,2]").is_empty());
        assert_eq!(
            parse_tool_arguments(" {\"device_name\":\"nx-2\"} ")["device_name"],
            "nx-2"
        );
    }

    #[test]
    fn tool_definition_completes_schema() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "get_device_ned_ids",
            "inputSchema": {"type": "object"}
        }))
        .expect("tool");
        let definition = serde_json::to_value(tool_definition(&tool)).expect("serialize");
        assert_eq!(definition["type"], "function");
        assert_eq!(definition["function"]["name"], "get_device_ned_ids");
        assert_eq!(definition["function"]["parameters"]["type"], "object");
        assert!(definition["function"]["parameters"]["properties"].is_object());
    }

    #[tokio::test]
    async fn tool_round_trip_feeds_result_back() {
        let server = MockServer::start().await;
        mount_stream(&server, tool_call_stream(), Some(1), None).await;
        mount_stream(&server, text_stream("ios-0 runs IOS."), None, Some("tool_call_id")).await;

        let backend = Arc::new(FakeBackend::default());
        let mut assistant = Assistant::new(settings(&server, 4), backend.clone());
        let mut streamed = String::new();
        let answer = assistant
            .process_query("What platform is ios-0?", &CancellationToken::new(), |chunk| {
                streamed.push_str(chunk)
            })
            .await
            .expect("answer");

        assert_eq!(answer, "ios-0 runs IOS.");
        assert_eq!(streamed, answer);
        assert_eq!(
            backend.calls.lock().expect("calls").as_slice(),
            [("get_device_platform".to_string(), json!({"device_name": "ios-0"}))]
        );

        let roles: Vec<&str> = assistant.history().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "tool", "assistant"]);

        let bodies = request_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0]["tools"].is_array());
        assert_eq!(bodies[1]["messages"][3]["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn tools_are_withheld_after_last_round() {
        let server = MockServer::start().await;
        mount_stream(&server, tool_call_stream(), Some(1), None).await;
        mount_stream(&server, text_stream("done"), None, Some("tool_call_id")).await;

        let backend = Arc::new(FakeBackend::default());
        let mut assistant = Assistant::new(settings(&server, 1), backend);
        assistant
            .process_query("platform?", &CancellationToken::new(), |_| {})
            .await
            .expect("answer");

        let bodies = request_bodies(&server).await;
        assert!(bodies[0].get("tools").is_some());
        assert!(bodies[1].get("tools").is_none());
    }

    #[tokio::test]
    async fn failed_tool_call_becomes_error_envelope() {
        let server = MockServer::start().await;
        mount_stream(&server, tool_call_stream(), Some(1), None).await;
        mount_stream(&server, text_stream("NSO did not answer."), None, Some("tool_call_id")).await;

        let backend = Arc::new(FakeBackend {
            fail_calls: true,
            ..FakeBackend::default()
        });
        let mut assistant = Assistant::new(settings(&server, 4), backend);
        assistant
            .process_query("platform?", &CancellationToken::new(), |_| {})
            .await
            .expect("answer");

        let tool_message = &assistant.history()[3];
        let envelope: Value =
            serde_json::from_str(tool_message.content.as_deref().expect("content")).expect("json");
        assert_eq!(
            envelope,
            json!({"status": "error", "error_message": "MCP stdio request timed out."})
        );
    }

    #[tokio::test]
    async fn history_persists_and_failures_roll_back() {
        let server = MockServer::start().await;
        mount_stream(&server, text_stream("Hello."), Some(1), None).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "upstream unavailable"}
            })))
            .mount(&server)
            .await;

        let mut assistant = Assistant::new(settings(&server, 4), Arc::new(FakeBackend::default()));
        assistant
            .process_query("hi", &CancellationToken::new(), |_| {})
            .await
            .expect("first answer");
        assert_eq!(assistant.history().len(), 3);

        let err = assistant
            .process_query("again", &CancellationToken::new(), |_| {})
            .await
            .expect_err("server error");
        assert!(err.starts_with("API Error: upstream unavailable"), "{err}");
        assert_eq!(assistant.history().len(), 3);
    }

    #[tokio::test]
    async fn stream_ends_when_the_sender_goes_away() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StreamMessage::Chunk("partial".to_string()))
            .expect("send");
        drop(tx);

        let mut seen = String::new();
        let turn = collect_turn(rx, &CancellationToken::new(), &mut |chunk: &str| {
            seen.push_str(chunk)
        })
        .await
        .expect("turn");
        assert_eq!(turn.content, "partial");
        assert!(turn.tool_calls.is_empty());
        assert_eq!(seen, "partial");
    }
}
