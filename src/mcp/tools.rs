//! NSO-backed MCP tools and the environment summary resource.
//!
//! Every tool answers with a JSON envelope rather than a protocol error:
//! `{"status":"success","data":…,"metadata":…}` or
//! `{"status":"error","error_message":…}`. Models read the envelope text, so
//! failures stay visible to them instead of aborting the exchange.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, SecondsFormat};
use rust_mcp_schema::{CallToolResult, TextContent, Tool, ToolInputSchema};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::nso::{DevicePlatform, DeviceSummary, Devices, NsoError};

pub const GET_DEVICE_NED_IDS: &str = "get_device_ned_ids";
pub const GET_DEVICE_PLATFORM: &str = "get_device_platform";
pub const GET_DEVICE_CONFIG: &str = "get_device_config";
pub const TOOL_NAMES: [&str; 3] = [GET_DEVICE_NED_IDS, GET_DEVICE_PLATFORM, GET_DEVICE_CONFIG];

const DEVICE_NAME: &str = "device_name";
const WRAPPED_PARAMS: &str = "params";
const MISSING_DEVICE_NAME: &str = "Missing required parameter: device_name";

/// Reads the server needs from NSO. [`Devices`] is the production
/// implementation.
#[async_trait]
pub trait DeviceInventory: Send + Sync {
    async fn device_ned_ids(&self) -> Result<Vec<String>, NsoError>;
    async fn device_platform(&self, device_name: &str) -> Result<DevicePlatform, NsoError>;
    async fn device_config(&self, device_name: &str) -> Result<Value, NsoError>;
    async fn devices(&self) -> Result<Vec<DeviceSummary>, NsoError>;
}

#[async_trait]
impl DeviceInventory for Devices {
    async fn device_ned_ids(&self) -> Result<Vec<String>, NsoError> {
        self.get_device_ned_ids().await
    }

    async fn device_platform(&self, device_name: &str) -> Result<DevicePlatform, NsoError> {
        self.get_device_platform(device_name).await
    }

    async fn device_config(&self, device_name: &str) -> Result<Value, NsoError> {
        self.get_device_config(device_name).await
    }

    async fn devices(&self) -> Result<Vec<DeviceSummary>, NsoError> {
        self.get_devices().await
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolSpec {
    /// Advertised form for `tools/list`. Keywords outside `properties` and
    /// `required` are enforced server-side only.
    pub fn to_tool(&self) -> Tool {
        let properties = self.input_schema["properties"].as_object().map(|properties| {
            properties
                .iter()
                .filter_map(|(name, schema)| Some((name.clone(), schema.as_object()?.clone())))
                .collect::<HashMap<_, _>>()
        });
        let required = self.input_schema["required"]
            .as_array()
            .map(|required| {
                required
                    .iter()
                    .filter_map(|name| name.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Tool {
            annotations: None,
            description: Some(self.description.to_string()),
            execution: None,
            icons: Vec::new(),
            input_schema: ToolInputSchema::new(required, properties, None),
            meta: None,
            name: self.name.to_string(),
            output_schema: None,
            title: None,
        }
    }
}

fn device_name_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            DEVICE_NAME: {
                "type": "string",
                "minLength": 1,
                "description": "Name of the device in NSO, e.g. 'ios-0', 'iosxr-1', 'nx-2'"
            }
        },
        "required": [DEVICE_NAME],
        "additionalProperties": false
    })
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_DEVICE_NED_IDS,
            description: "Retrieve the available Network Element Driver (NED) IDs in Cisco NSO",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: GET_DEVICE_PLATFORM,
            description: "Retrieve platform information for a specific device in Cisco NSO. Requires a device_name parameter (e.g., 'ios-0', 'iosxr-1', 'nx-2').",
            input_schema: device_name_schema(),
        },
        ToolSpec {
            name: GET_DEVICE_CONFIG,
            description: "Retrieve the full configuration NSO holds for a specific device. Requires a device_name parameter.",
            input_schema: device_name_schema(),
        },
    ]
}

/// Result of running one tool: the envelope and whether it reports failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub envelope: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    fn success(envelope: Value) -> Self {
        Self {
            envelope,
            is_error: false,
        }
    }

    fn failure(envelope: Value) -> Self {
        Self {
            envelope,
            is_error: true,
        }
    }

    /// The envelope as pretty text plus structured content.
    pub fn into_call_result(self) -> CallToolResult {
        let text = serde_json::to_string_pretty(&self.envelope)
            .unwrap_or_else(|_| self.envelope.to_string());
        CallToolResult {
            content: vec![TextContent::new(text, None, None).into()],
            is_error: Some(self.is_error),
            meta: None,
            structured_content: match self.envelope {
                Value::Object(map) => Some(map),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownTool(pub String);

pub struct NsoTools {
    inventory: Arc<dyn DeviceInventory>,
    specs: Vec<ToolSpec>,
    validators: HashMap<&'static str, jsonschema::Validator>,
}

impl NsoTools {
    pub fn new(inventory: Arc<dyn DeviceInventory>) -> Result<Self, String> {
        let specs = tool_specs();
        let mut validators = HashMap::new();
        for spec in &specs {
            let validator = jsonschema::validator_for(&spec.input_schema)
                .map_err(|err| format!("Invalid input schema for {}: {err}", spec.name))?;
            validators.insert(spec.name, validator);
        }
        Ok(Self {
            inventory,
            specs,
            validators,
        })
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub async fn call(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutcome, UnknownTool> {
        let arguments = unwrap_params(arguments.unwrap_or_default());
        let shown = Value::Object(arguments.clone());
        info!(tool = name, arguments = %shown, "Tool call");

        let Some(validator) = self.validators.get(name) else {
            return Err(UnknownTool(name.to_string()));
        };
        let takes_device = name != GET_DEVICE_NED_IDS;
        let device_name = required_device_name(&arguments);
        if takes_device && device_name.is_none() {
            return Ok(ToolOutcome::failure(error_envelope(MISSING_DEVICE_NAME.to_string())));
        }
        let problems: Vec<String> = validator
            .iter_errors(&shown)
            .map(|err| err.to_string())
            .collect();
        if !problems.is_empty() {
            return Ok(ToolOutcome::failure(error_envelope(format!(
                "Invalid arguments: {}",
                problems.join("; ")
            ))));
        }

        let outcome = match (name, device_name) {
            (GET_DEVICE_PLATFORM, Some(device_name)) => self.get_device_platform(&device_name).await,
            (GET_DEVICE_CONFIG, Some(device_name)) => self.get_device_config(&device_name).await,
            _ => self.get_device_ned_ids().await,
        };
        Ok(outcome)
    }

    async fn get_device_ned_ids(&self) -> ToolOutcome {
        match self.inventory.device_ned_ids().await {
            Ok(ids) => {
                let count = ids.len();
                let envelope = json!({
                    "status": "success",
                    "data": {"device_ned_ids": ids},
                    "metadata": {"timestamp": timestamp(), "count": count}
                });
                info!(count, "Retrieved NED IDs");
                ToolOutcome::success(envelope)
            }
            Err(err) => {
                error!(error = %err, "Error retrieving NED IDs");
                let mut envelope = error_envelope(describe_failure(&err));
                envelope["device_ned_ids"] = json!([]);
                ToolOutcome::failure(envelope)
            }
        }
    }

    async fn get_device_platform(&self, device_name: &str) -> ToolOutcome {
        info!(device = device_name, "Getting platform information");
        match self.inventory.device_platform(device_name).await {
            Ok(platform) => ToolOutcome::success(json!({
                "status": "success",
                "data": {"device_platform": platform},
                "metadata": {"timestamp": timestamp(), "device": device_name}
            })),
            Err(err) => {
                error!(device = device_name, error = %err, "Error retrieving platform");
                ToolOutcome::failure(error_envelope(describe_failure(&err)))
            }
        }
    }

    async fn get_device_config(&self, device_name: &str) -> ToolOutcome {
        match self.inventory.device_config(device_name).await {
            Ok(config) => ToolOutcome::success(json!({
                "status": "success",
                "data": {"device_config": config},
                "metadata": {"timestamp": timestamp(), "device": device_name}
            })),
            Err(err) => {
                error!(device = device_name, error = %err, "Error retrieving config");
                ToolOutcome::failure(error_envelope(describe_failure(&err)))
            }
        }
    }

    /// Devices and NED IDs in one document, read concurrently.
    pub async fn environment_summary(&self) -> ToolOutcome {
        let (devices, ned_ids) =
            tokio::join!(self.inventory.devices(), self.inventory.device_ned_ids());
        match (devices, ned_ids) {
            (Ok(devices), Ok(ned_ids)) => ToolOutcome::success(json!({
                "status": "success",
                "data": {
                    "device_count": devices.len(),
                    "devices": devices,
                    "device_ned_ids": ned_ids
                },
                "metadata": {"timestamp": timestamp()}
            })),
            (Err(err), _) | (_, Err(err)) => {
                error!(error = %err, "Error building environment summary");
                ToolOutcome::failure(error_envelope(describe_failure(&err)))
            }
        }
    }
}

/// Accepts `{"params": {...}}` as sent by clients that wrap every argument
/// object, as well as the flat form.
fn unwrap_params(mut arguments: Map<String, Value>) -> Map<String, Value> {
    if arguments.len() == 1 && arguments.get(WRAPPED_PARAMS).is_some_and(Value::is_object) {
        if let Some(Value::Object(inner)) = arguments.remove(WRAPPED_PARAMS) {
            return inner;
        }
    }
    arguments
}

fn required_device_name(arguments: &Map<String, Value>) -> Option<String> {
    match arguments.get(DEVICE_NAME) {
        Some(Value::String(name)) if !name.trim().is_empty() => Some(name.trim().to_string()),
        _ => None,
    }
}

fn describe_failure(err: &NsoError) -> String {
    if err.is_request_failure() {
        err.to_string()
    } else {
        format!("Unexpected error: {err}")
    }
}

fn error_envelope(message: String) -> Value {
    json!({"status": "error", "error_message": message})
}

fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}
