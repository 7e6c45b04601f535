//! HTTP client for the Status app development API.

use std::collections::BTreeMap;
use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::DeviceConfig;
use crate::error::{RemoteError, UnreachableReason};

use super::{NetworkDescriptor, NetworkTable, RemoteControl, RemoteNetworkId};

const PONG: &str = "Pong!";

/// Talks to one Status app over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    base: url::Url,
}

impl StatusClient {
    pub fn new(device: &DeviceConfig) -> Result<Self, RemoteError> {
        let base = device
            .base_url()
            .map_err(|e| RemoteError::Client(e.to_string()))?;
        Self::with_base_url(&base, device.timeout)
    }

    /// Build a client for an explicit base URL (`http://<ip>:<port>`).
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base = url::Url::parse(base_url)
            .map_err(|e| RemoteError::Client(format!("invalid base URL '{base_url}': {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;
        Ok(Self { http, base })
    }

    pub fn endpoint(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Reply, RemoteError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| RemoteError::Client(format!("invalid path '{path}': {e}")))?;

        let mut request = self.http.request(method.clone(), url);
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.unreachable(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.unreachable(&e))?;

        tracing::trace!(
            "REQUEST: {} {} {}\nRESPONSE: {} {}",
            method,
            path,
            body.as_ref().map(|b| b.to_string()).unwrap_or_default(),
            status.as_u16(),
            text
        );

        Ok(Reply::new(status, &text))
    }

    fn unreachable(&self, error: &reqwest::Error) -> RemoteError {
        RemoteError::Unreachable {
            endpoint: self.endpoint().to_string(),
            reason: classify_transport_error(error),
            detail: error.to_string(),
        }
    }
}

#[async_trait]
impl RemoteControl for StatusClient {
    async fn ping(&self) -> bool {
        match self.send(Method::POST, "/ping", Some(json!({}))).await {
            Ok(reply) => reply.status.is_success() && reply.message() == Some(PONG),
            Err(e) => {
                tracing::debug!("Ping failed: {}", e);
                false
            }
        }
    }

    async fn list_networks(&self) -> Result<NetworkTable, RemoteError> {
        const OPERATION: &str = "list networks";

        let reply = self.send(Method::GET, "/networks", None).await?;
        if !reply.status.is_success() {
            return Err(reply.rejection(OPERATION));
        }
        let body = reply.body.ok_or_else(|| RemoteError::MalformedResponse {
            operation: OPERATION,
            reason: "empty response".to_string(),
        })?;
        let wire: WireNetworkList =
            serde_json::from_value(body).map_err(|e| RemoteError::MalformedResponse {
                operation: OPERATION,
                reason: e.to_string(),
            })?;
        Ok(wire.into_table())
    }

    async fn add_network(
        &self,
        name: &str,
        node_url: &str,
        chain_name: &str,
        network_id: u64,
    ) -> Result<RemoteNetworkId, RemoteError> {
        const OPERATION: &str = "add network";

        let body = json!({
            "name": name,
            "url": node_url,
            "chain": chain_name,
            "network-id": network_id,
        });
        let reply = self.send(Method::POST, "/network", Some(body)).await?;
        if !reply.status.is_success() {
            return Err(reply.rejection(OPERATION));
        }
        if reply.body.is_none() {
            return Err(RemoteError::MalformedResponse {
                operation: OPERATION,
                reason: "empty response; the phone may be in standby or the Status app in the \
                         background"
                    .to_string(),
            });
        }
        reply.network_id().ok_or_else(|| RemoteError::MalformedResponse {
            operation: OPERATION,
            reason: "no 'network-id' present".to_string(),
        })
    }

    async fn connect(&self, id: &RemoteNetworkId) -> Result<RemoteNetworkId, RemoteError> {
        const OPERATION: &str = "connect";

        let reply = self
            .send(Method::POST, "/network/connect", Some(json!({ "id": id.as_str() })))
            .await?;

        let unknown = reply.status == StatusCode::NOT_FOUND
            || reply.message().is_some_and(is_unknown_network_message);
        if unknown {
            return Err(RemoteError::UnknownNetwork {
                id: id.to_string(),
                message: reply
                    .message()
                    .unwrap_or("network not found")
                    .to_string(),
            });
        }
        if !reply.status.is_success() {
            return Err(reply.rejection(OPERATION));
        }
        // Older apps answer with only a message.
        Ok(reply.network_id().unwrap_or_else(|| id.clone()))
    }

    async fn open_dapp(&self, url: &str) -> Result<(), RemoteError> {
        let reply = self
            .send(Method::POST, "/dapp/open", Some(json!({ "url": url })))
            .await?;
        if !reply.status.is_success() {
            return Err(reply.rejection("open dApp"));
        }
        Ok(())
    }

    async fn remove_network(&self, id: &RemoteNetworkId) -> Result<(), RemoteError> {
        let reply = self
            .send(Method::DELETE, "/network", Some(json!({ "id": id.as_str() })))
            .await?;
        if !reply.status.is_success() || reply.network_id().is_none() {
            return Err(reply.rejection("remove network"));
        }
        Ok(())
    }
}

/// A response from the Status app; the body is `None` when empty or not JSON.
struct Reply {
    status: StatusCode,
    body: Option<serde_json::Value>,
}

impl Reply {
    fn new(status: StatusCode, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(text).ok()
        };
        Self { status, body }
    }

    fn message(&self) -> Option<&str> {
        self.body.as_ref()?.get("message")?.as_str()
    }

    fn network_id(&self) -> Option<RemoteNetworkId> {
        match self.body.as_ref()?.get("network-id")? {
            serde_json::Value::String(s) => RemoteNetworkId::new(s.as_str()),
            serde_json::Value::Number(n) => RemoteNetworkId::new(n.to_string()),
            _ => None,
        }
    }

    fn rejection(&self, operation: &'static str) -> RemoteError {
        RemoteError::Rejected {
            operation,
            status: Some(self.status.as_u16()),
            message: self
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", self.status.as_u16())),
        }
    }
}

fn is_unknown_network_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("doesn't exist") || lowered.contains("does not exist")
}

fn classify_transport_error(error: &reqwest::Error) -> UnreachableReason {
    if error.is_timeout() {
        return UnreachableReason::Timeout;
    }

    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<std::io::Error>() {
            return match io_error.kind() {
                std::io::ErrorKind::TimedOut => UnreachableReason::Timeout,
                std::io::ErrorKind::NotFound => UnreachableReason::Dns,
                std::io::ErrorKind::ConnectionRefused => UnreachableReason::ConnectionRefused,
                _ => UnreachableReason::Other,
            };
        }
        source = err.source();
    }

    let lowered = error.to_string().to_ascii_lowercase();
    if lowered.contains("dns")
        || lowered.contains("lookup")
        || lowered.contains("name or service not known")
    {
        UnreachableReason::Dns
    } else if lowered.contains("refused") {
        UnreachableReason::ConnectionRefused
    } else {
        UnreachableReason::Other
    }
}

#[derive(Debug, Deserialize)]
struct WireNetworkList {
    #[serde(default)]
    networks: BTreeMap<String, WireNetwork>,
}

#[derive(Debug, Deserialize)]
struct WireNetwork {
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: WireNetworkConfig,
    #[serde(default, rename = "active?", alias = "active")]
    active: bool,
}

#[derive(Debug, Default, Deserialize)]
struct WireNetworkConfig {
    #[serde(default, rename = "UpstreamConfig")]
    upstream: Option<WireUpstream>,
    #[serde(default, rename = "NetworkId")]
    network_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireUpstream {
    #[serde(default, rename = "URL")]
    url: Option<String>,
}

impl WireNetworkList {
    fn into_table(self) -> NetworkTable {
        self.networks
            .into_iter()
            .filter_map(|(id, network)| {
                let id = RemoteNetworkId::new(id)?;
                let network_id = network.config.network_id.as_ref().and_then(|value| match value {
                    serde_json::Value::Number(n) => n.as_u64(),
                    serde_json::Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                });
                let descriptor = NetworkDescriptor {
                    name: network.name,
                    upstream_url: network.config.upstream.and_then(|u| u.url),
                    network_id,
                    active: network.active,
                };
                Some((id, descriptor))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StatusClient {
        StatusClient::with_base_url(&server.uri(), Duration::from_millis(500)).unwrap()
    }

    fn id(raw: &str) -> RemoteNetworkId {
        RemoteNetworkId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn ping_true_only_for_pong() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ping"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Pong!"})))
            .mount(&server)
            .await;
        assert!(client(&server).ping().await);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;
        assert!(!client(&server).ping().await);
    }

    #[tokio::test]
    async fn ping_false_when_unreachable() {
        let client =
            StatusClient::with_base_url("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(!client.ping().await);
    }

    #[tokio::test]
    async fn add_network_sends_wire_body_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network"))
            .and(body_json(json!({
                "name": "Embark (my-dapp)",
                "url": "http://192.168.1.42:8545",
                "chain": "embark",
                "network-id": 1337
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Network has been added.",
                "network-id": "1535660846036b3c3241022ec5046af53cdb769dcc216"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let added = client(&server)
            .add_network("Embark (my-dapp)", "http://192.168.1.42:8545", "embark", 1337)
            .await
            .unwrap();
        assert_eq!(added, id("1535660846036b3c3241022ec5046af53cdb769dcc216"));
    }

    #[tokio::test]
    async fn add_network_without_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "Network has been added."})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .add_network("n", "http://10.0.0.1:8545", "embark", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn add_network_empty_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client(&server)
            .add_network("n", "http://10.0.0.1:8545", "embark", 1)
            .await
            .unwrap_err();
        match err {
            RemoteError::MalformedResponse { reason, .. } => assert!(reason.contains("standby")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_network_rejection_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Please, check the validity of network information."
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .add_network("n", "bogus", "embark", 1)
            .await
            .unwrap_err();
        match err {
            RemoteError::Rejected {
                status, message, ..
            } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "Please, check the validity of network information.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_detects_unknown_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network/connect"))
            .and(body_json(json!({"id": "gone"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "The network id you provided doesn't exist."
            })))
            .mount(&server)
            .await;

        let err = client(&server).connect(&id("gone")).await.unwrap_err();
        assert!(matches!(err, RemoteError::UnknownNetwork { ref id, .. } if id == "gone"));
    }

    #[tokio::test]
    async fn connect_success_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network/connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Network has been connected.",
                "network-id": "abc123"
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).connect(&id("abc123")).await.unwrap(), id("abc123"));
    }

    #[tokio::test]
    async fn connect_without_network_id_keeps_requested_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/network/connect"))
            .and(body_json(json!({"id": "abc123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Network has been connected."
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client(&server).connect(&id("abc123")).await.unwrap(), id("abc123"));
    }

    #[tokio::test]
    async fn list_networks_parses_status_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/networks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "networks": {
                    "abc123": {
                        "name": "Embark (my-dapp)",
                        "config": {
                            "UpstreamConfig": {"Enabled": true, "URL": "http://192.168.1.42:8545"},
                            "NetworkId": 1337
                        },
                        "active?": true
                    },
                    "mainnet_rpc": {
                        "name": "Mainnet with upstream RPC",
                        "config": {"NetworkId": "1"}
                    }
                }
            })))
            .mount(&server)
            .await;

        let table = client(&server).list_networks().await.unwrap();
        assert_eq!(table.len(), 2);

        let ours = &table[&id("abc123")];
        assert!(ours.active);
        assert!(ours.matches("Embark (my-dapp)", "http://192.168.1.42:8545", 1337));

        let mainnet = &table[&id("mainnet_rpc")];
        assert!(!mainnet.active);
        assert_eq!(mainnet.network_id, Some(1));
        assert_eq!(mainnet.upstream_url, None);
    }

    #[tokio::test]
    async fn list_networks_unsupported_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/networks"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).list_networks().await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn open_dapp_and_remove_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dapp/open"))
            .and(body_json(json!({"url": "http://192.168.1.42:8000/"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "URL has been opened."})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/network"))
            .and(body_json(json!({"id": "abc123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Network has been deleted.",
                "network-id": "abc123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client.open_dapp("http://192.168.1.42:8000/").await.unwrap();
        client.remove_network(&id("abc123")).await.unwrap();
    }

    #[tokio::test]
    async fn remove_network_refusal_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/network"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Cannot delete the provided network."
            })))
            .mount(&server)
            .await;

        let err = client(&server).remove_network(&id("abc123")).await.unwrap_err();
        match err {
            RemoteError::Rejected { message, .. } => {
                assert_eq!(message, "Cannot delete the provided network.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_is_classified() {
        let client =
            StatusClient::with_base_url("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = client.list_networks().await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
