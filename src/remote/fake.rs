//! In-memory Status app for engine tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RemoteError, UnreachableReason};

use super::{NetworkDescriptor, NetworkTable, RemoteControl, RemoteNetworkId};

#[derive(Default)]
struct State {
    pings: VecDeque<bool>,
    ping_delay: Option<Duration>,
    networks: NetworkTable,
    list_error: Option<fn() -> RemoteError>,
    add_error: Option<fn() -> RemoteError>,
    next_ids: VecDeque<String>,
    calls: Vec<String>,
}

/// Scriptable [`RemoteControl`] that records every call.
pub(crate) struct FakeRemote {
    state: Mutex<State>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Queue ping answers; once drained, ping answers `true`.
    pub(crate) fn script_pings(&self, answers: &[bool]) {
        self.state.lock().unwrap().pings.extend(answers);
    }

    pub(crate) fn set_ping_delay(&self, delay: Duration) {
        self.state.lock().unwrap().ping_delay = Some(delay);
    }

    pub(crate) fn insert_network(&self, id: &str, descriptor: NetworkDescriptor) {
        self.state
            .lock()
            .unwrap()
            .networks
            .insert(RemoteNetworkId::new(id).unwrap(), descriptor);
    }

    pub(crate) fn fail_list_with(&self, error: fn() -> RemoteError) {
        self.state.lock().unwrap().list_error = Some(error);
    }

    pub(crate) fn fail_add_with(&self, error: fn() -> RemoteError) {
        self.state.lock().unwrap().add_error = Some(error);
    }

    pub(crate) fn queue_ids(&self, ids: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .next_ids
            .extend(ids.iter().map(|id| id.to_string()));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.as_str() == call || c.starts_with(&format!("{call}:")))
            .count()
    }

    pub(crate) fn networks(&self) -> NetworkTable {
        self.state.lock().unwrap().networks.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

pub(crate) fn unreachable() -> RemoteError {
    RemoteError::Unreachable {
        endpoint: "http://192.168.1.20:5561".to_string(),
        reason: UnreachableReason::ConnectionRefused,
        detail: "connection refused".to_string(),
    }
}

pub(crate) fn unsupported() -> RemoteError {
    RemoteError::Rejected {
        operation: "list networks",
        status: Some(404),
        message: "HTTP 404".to_string(),
    }
}

pub(crate) fn no_network_id() -> RemoteError {
    RemoteError::MalformedResponse {
        operation: "add network",
        reason: "no 'network-id' present".to_string(),
    }
}

#[async_trait]
impl RemoteControl for FakeRemote {
    async fn ping(&self) -> bool {
        self.record("ping".to_string());
        let delay = self.state.lock().unwrap().ping_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().pings.pop_front().unwrap_or(true)
    }

    async fn list_networks(&self) -> Result<NetworkTable, RemoteError> {
        self.record("list".to_string());
        let state = self.state.lock().unwrap();
        match state.list_error {
            Some(error) => Err(error()),
            None => Ok(state.networks.clone()),
        }
    }

    async fn add_network(
        &self,
        name: &str,
        node_url: &str,
        _chain_name: &str,
        network_id: u64,
    ) -> Result<RemoteNetworkId, RemoteError> {
        self.record("add".to_string());
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.add_error {
            return Err(error());
        }
        let raw = state
            .next_ids
            .pop_front()
            .unwrap_or_else(|| "abc123".to_string());
        let id = RemoteNetworkId::new(raw).unwrap();
        state.networks.insert(
            id.clone(),
            NetworkDescriptor {
                name: name.to_string(),
                upstream_url: Some(node_url.to_string()),
                network_id: Some(network_id),
                active: false,
            },
        );
        Ok(id)
    }

    async fn connect(&self, id: &RemoteNetworkId) -> Result<RemoteNetworkId, RemoteError> {
        self.record(format!("connect:{id}"));
        let mut state = self.state.lock().unwrap();
        if !state.networks.contains_key(id) {
            return Err(RemoteError::UnknownNetwork {
                id: id.to_string(),
                message: "The network id you provided doesn't exist.".to_string(),
            });
        }
        for (key, network) in state.networks.iter_mut() {
            network.active = key == id;
        }
        Ok(id.clone())
    }

    async fn open_dapp(&self, url: &str) -> Result<(), RemoteError> {
        self.record(format!("open:{url}"));
        Ok(())
    }

    async fn remove_network(&self, id: &RemoteNetworkId) -> Result<(), RemoteError> {
        self.record(format!("remove:{id}"));
        self.state.lock().unwrap().networks.remove(id);
        Ok(())
    }
}
