use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use super::NsoError;
use crate::core::config::data::NsoConfig;

const RESTCONF_DATA_ROOT: &str = "restconf/data";
const YANG_JSON: &str = "application/yang-data+json";

/// Thin RESTCONF client bound to one NSO instance.
#[derive(Clone)]
pub struct NsoClient {
    http: reqwest::Client,
    data_root: Url,
    username: String,
    password: String,
}

impl NsoClient {
    pub fn new(config: &NsoConfig) -> Result<Self, NsoError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let data_root = restconf_data_root(config)?;
        debug!(url = %data_root, "NSO RESTCONF client initialized");
        Ok(Self {
            http,
            data_root,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn data_root(&self) -> &Url {
        &self.data_root
    }

    /// Builds a data-store URL from path segments; each segment is encoded
    /// on its own so device names cannot escape their key.
    pub fn data_url(&self, segments: &[&str], query: Option<&str>) -> Result<Url, NsoError> {
        let mut url = self.data_root.clone();
        url.path_segments_mut()
            .map_err(|_| NsoError::InvalidArgument("NSO URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.set_query(query);
        Ok(url)
    }

    /// GETs a data-store resource. A 204 answer means the node exists but is
    /// empty, which maps to `Value::Null`.
    pub async fn get_json(&self, segments: &[&str], query: Option<&str>) -> Result<Value, NsoError> {
        let url = self.data_url(segments, query)?;
        let path = segments.join("/");
        debug!(url = %url, "RESTCONF GET");

        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", YANG_JSON)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(NsoError::NotFound { path });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(NsoError::Status {
                path,
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let body = response.text().await?;
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn restconf_data_root(config: &NsoConfig) -> Result<Url, NsoError> {
    let raw = format!(
        "{}://{}:{}/{}/",
        config.scheme, config.address, config.port, RESTCONF_DATA_ROOT
    );
    Url::parse(&raw).map_err(|err| NsoError::InvalidArgument(format!("Invalid NSO URL {raw}: {err}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn config_for(server: &MockServer) -> NsoConfig {
        let address = server.address();
        NsoConfig {
            scheme: "http".to_string(),
            address: address.ip().to_string(),
            port: address.port(),
            timeout_secs: 5,
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }

    #[test]
    fn data_url_encodes_each_segment() {
        let client = NsoClient::new(&NsoConfig::default()).expect("client");
        let url = client
            .data_url(&["tailf-ncs:devices", "device=core/1", "platform"], None)
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/restconf/data/tailf-ncs:devices/device=core%2F1/platform"
        );
    }

    #[test]
    fn data_url_keeps_field_selectors_literal() {
        let client = NsoClient::new(&NsoConfig::default()).expect("client");
        let url = client
            .data_url(&["tailf-ncs:devices", "device"], Some("fields=name;address"))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/restconf/data/tailf-ncs:devices/device?fields=name;address"
        );
    }

    #[tokio::test]
    async fn get_json_sends_basic_auth_and_yang_accept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/tailf-ncs:devices/ned-ids"))
            .and(header("Accept", YANG_JSON))
            .and(header("Authorization", "Basic YWRtaW46YWRtaW4="))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = NsoClient::new(&config_for(&server)).expect("client");
        let value = client
            .get_json(&["tailf-ncs:devices", "ned-ids"], None)
            .await
            .expect("json");
        assert_eq!(value, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn get_json_maps_no_content_to_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = NsoClient::new(&config_for(&server)).expect("client");
        let value = client
            .get_json(&["tailf-ncs:devices", "ned-ids"], None)
            .await
            .expect("json");
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn get_json_reports_missing_and_failed_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/locked"))
            .respond_with(ResponseTemplate::new(401).set_body_string("access-denied\n"))
            .mount(&server)
            .await;

        let client = NsoClient::new(&config_for(&server)).expect("client");
        let missing = client.get_json(&["missing"], None).await.expect_err("404");
        assert!(matches!(missing, NsoError::NotFound { ref path } if path == "missing"));

        let locked = client.get_json(&["locked"], None).await.expect_err("401");
        match locked {
            NsoError::Status { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "access-denied");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
