//! Local chain readiness and network id discovery.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ChainConfig;
use crate::error::ChainError;

/// Answers once the local node is up.
#[async_trait]
pub trait ChainProbe: Send + Sync {
    /// The node's numeric network id.
    async fn network_id(&self) -> Result<u64, ChainError>;
}

/// Probes the node with JSON-RPC `net_version`.
#[derive(Debug, Clone)]
pub struct RpcChainProbe {
    http: reqwest::Client,
    url: String,
}

impl RpcChainProbe {
    pub fn new(chain: &ChainConfig, timeout: Duration) -> Result<Self, ChainError> {
        let url = chain
            .local_rpc_url()
            .map_err(|e| ChainError::Client(e.to_string()))?;
        Self::with_url(url, timeout)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Client(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ChainProbe for RpcChainProbe {
    async fn network_id(&self) -> Result<u64, ChainError> {
        let unavailable = |detail: String| ChainError::Unavailable {
            url: self.url.clone(),
            detail,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "net_version",
                "params": []
            }))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = body.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        match body.result {
            Some(value) => parse_network_id(&value),
            None => Err(ChainError::InvalidNetworkId("missing result".to_string())),
        }
    }
}

/// Accepts a decimal string, a `0x` hex string or a JSON number.
fn parse_network_id(value: &serde_json::Value) -> Result<u64, ChainError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    };
    parsed.ok_or_else(|| ChainError::InvalidNetworkId(value.to_string()))
}

/// Wait until the node answers, then return the network id to register.
///
/// A configured id wins over the one the node reports, but the node must
/// still answer before scheduling starts.
pub async fn wait_for_chain(probe: &dyn ChainProbe, configured: Option<u64>, poll: Duration) -> u64 {
    let mut logged = false;
    loop {
        match probe.network_id().await {
            Ok(reported) => {
                let network_id = configured.unwrap_or(reported);
                if configured.is_some_and(|id| id != reported) {
                    tracing::warn!(
                        "Configured network id {} differs from the node's {}; using {}",
                        network_id,
                        reported,
                        network_id
                    );
                }
                tracing::info!("Chain is ready (network id {})", network_id);
                return network_id;
            }
            Err(e) => {
                if logged {
                    tracing::debug!("Chain not ready: {}", e);
                } else {
                    tracing::info!("Waiting for the chain to start: {}", e);
                    logged = true;
                }
                tokio::time::sleep(poll).await;
            }
        }
    }
}
