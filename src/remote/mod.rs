//! Status app development API.
//!
//! The Status app exposes a small JSON/HTTP control surface on the phone
//! (port 5561 by default). [`RemoteControl`] is the seam the reconciler
//! drives; [`StatusClient`] is the HTTP implementation.

mod client;
pub mod health;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

pub use self::client::StatusClient;

/// Opaque, non-empty network identifier issued by the Status app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteNetworkId(String);

impl RemoteNetworkId {
    /// Wrap a raw id. Surrounding whitespace is dropped; blank ids are `None`.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteNetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One network configured in the Status app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDescriptor {
    pub name: String,
    pub upstream_url: Option<String>,
    pub network_id: Option<u64>,
    pub active: bool,
}

impl NetworkDescriptor {
    /// Whether this entry describes exactly the given network.
    pub fn matches(&self, name: &str, upstream_url: &str, network_id: u64) -> bool {
        self.name == name
            && self.upstream_url.as_deref() == Some(upstream_url)
            && self.network_id == Some(network_id)
    }
}

/// The Status app's full network table.
pub type NetworkTable = BTreeMap<RemoteNetworkId, NetworkDescriptor>;

/// Commands the Status app understands.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    /// True iff the app answers with its liveness payload. Never fails.
    async fn ping(&self) -> bool;

    async fn list_networks(&self) -> Result<NetworkTable, RemoteError>;

    async fn add_network(
        &self,
        name: &str,
        node_url: &str,
        chain_name: &str,
        network_id: u64,
    ) -> Result<RemoteNetworkId, RemoteError>;

    /// Switch the app to an existing network.
    async fn connect(&self, id: &RemoteNetworkId) -> Result<RemoteNetworkId, RemoteError>;

    /// Open a URL in the app's dApp browser.
    async fn open_dapp(&self, url: &str) -> Result<(), RemoteError>;

    async fn remove_network(&self, id: &RemoteNetworkId) -> Result<(), RemoteError>;
}
