//! Device-tree queries against `tailf-ncs:devices`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{NsoClient, NsoError};

const DEVICES: &str = "tailf-ncs:devices";

/// Platform facts NSO learned from a device during sync-from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePlatform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(
        rename = "serial-number",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<DevicePlatform>,
}

#[derive(Deserialize)]
struct NedIdEntry {
    id: String,
}

/// Read-only helper over the device tree, one RESTCONF GET per call.
#[derive(Clone)]
pub struct Devices {
    client: NsoClient,
}

impl Devices {
    pub fn new(client: NsoClient) -> Self {
        Self { client }
    }

    pub async fn get_device_ned_ids(&self) -> Result<Vec<String>, NsoError> {
        let value = self.client.get_json(&[DEVICES, "ned-ids"], None).await?;
        let entries = match value.pointer("/tailf-ncs:ned-ids/ned-id") {
            Some(list) => serde_json::from_value::<Vec<NedIdEntry>>(list.clone())?,
            None => Vec::new(),
        };
        Ok(entries.into_iter().map(|entry| entry.id).collect())
    }

    pub async fn get_device_platform(&self, device_name: &str) -> Result<DevicePlatform, NsoError> {
        let key = device_key(device_name)?;
        let value = self
            .client
            .get_json(&[DEVICES, &key, "platform"], None)
            .await?;
        match value.get("tailf-ncs:platform") {
            Some(platform) => Ok(serde_json::from_value(platform.clone())?),
            None => Ok(DevicePlatform::default()),
        }
    }

    pub async fn get_device_config(&self, device_name: &str) -> Result<Value, NsoError> {
        let key = device_key(device_name)?;
        let value = self
            .client
            .get_json(&[DEVICES, &key, "config"], None)
            .await?;
        Ok(match value {
            Value::Object(mut map) => map
                .remove("tailf-ncs:config")
                .unwrap_or(Value::Object(map)),
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        })
    }

    pub async fn get_devices(&self) -> Result<Vec<DeviceSummary>, NsoError> {
        let value = self
            .client
            .get_json(&[DEVICES, "device"], Some("fields=name;address;platform"))
            .await?;
        match value.get("tailf-ncs:device") {
            Some(list) => Ok(serde_json::from_value(list.clone())?),
            None => Ok(Vec::new()),
        }
    }
}

fn device_key(device_name: &str) -> Result<String, NsoError> {
    let trimmed = device_name.trim();
    if trimmed.is_empty() {
        return Err(NsoError::InvalidArgument(
            "Device name is required".to_string(),
        ));
    }
    Ok(format!("device={trimmed}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nso::client::tests::config_for;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn devices_for(server: &MockServer) -> Devices {
        Devices::new(NsoClient::new(&config_for(server)).expect("client"))
    }

    #[tokio::test]
    async fn ned_ids_are_flattened_to_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/tailf-ncs:devices/ned-ids"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tailf-ncs:ned-ids": {
                    "ned-id": [
                        {"id": "cisco-ios-cli-6.90:cisco-ios-cli-6.90"},
                        {"id": "cisco-iosxr-cli-7.40:cisco-iosxr-cli-7.40"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let ids = devices_for(&server)
            .await
            .get_device_ned_ids()
            .await
            .expect("ned ids");
        assert_eq!(
            ids,
            vec![
                "cisco-ios-cli-6.90:cisco-ios-cli-6.90".to_string(),
                "cisco-iosxr-cli-7.40:cisco-iosxr-cli-7.40".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn empty_ned_id_container_yields_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let ids = devices_for(&server)
            .await
            .get_device_ned_ids()
            .await
            .expect("ned ids");
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn platform_is_read_from_keyed_device_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/tailf-ncs:devices/device=ios-0/platform"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tailf-ncs:platform": {
                    "name": "ios",
                    "version": "15.2(4)M7",
                    "model": "NETSIM",
                    "serial-number": "123456"
                }
            })))
            .mount(&server)
            .await;

        let platform = devices_for(&server)
            .await
            .get_device_platform("ios-0")
            .await
            .expect("platform");
        assert_eq!(platform.name.as_deref(), Some("ios"));
        assert_eq!(platform.model.as_deref(), Some("NETSIM"));
        assert_eq!(platform.serial_number.as_deref(), Some("123456"));
    }

    #[tokio::test]
    async fn blank_device_name_is_rejected_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = devices_for(&server)
            .await
            .get_device_platform("  ")
            .await
            .expect_err("blank name");
        assert_eq!(err.to_string(), "Device name is required");
    }

    #[tokio::test]
    async fn config_unwraps_the_config_container() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/tailf-ncs:devices/device=nx-2/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tailf-ncs:config": {"tailf-ned-cisco-nx:hostname": "nx-2"}
            })))
            .mount(&server)
            .await;

        let config = devices_for(&server)
            .await
            .get_device_config("nx-2")
            .await
            .expect("config");
        assert_eq!(config, json!({"tailf-ned-cisco-nx:hostname": "nx-2"}));
    }

    #[tokio::test]
    async fn device_list_requests_summary_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/tailf-ncs:devices/device"))
            .and(query_param("fields", "name;address;platform"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tailf-ncs:device": [
                    {"name": "ios-0", "address": "127.0.0.1", "platform": {"name": "ios"}},
                    {"name": "nx-2"}
                ]
            })))
            .mount(&server)
            .await;

        let devices = devices_for(&server)
            .await
            .get_devices()
            .await
            .expect("devices");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].address.as_deref(), Some("127.0.0.1"));
        assert!(devices[1].platform.is_none());
    }
}
