//! Network reconciliation.
//!
//! One attempt walks an explicit state machine:
//!
//! ```text
//! Idle -> Probing -> { Creating | ConnectingCached | ConnectingDiscovered } -> Connected
//!   \________\_____________\______________\__________________________________-> Failed
//! ```
//!
//! `Connected` and `Failed` end the attempt. The [`scheduler`] re-enters
//! `Idle` on its next tick after a failure.

pub mod scheduler;

use std::sync::Arc;

use serde::Serialize;

use crate::config::{
    ChainConfig, Config, DEVICE_IP_METADATA_KEY, PluginConfig, ReconcilePolicy, WebServerConfig,
};
use crate::error::{ConfigError, FailureKind, RemoteError};
use crate::network::{
    Fingerprint, LanResolver, NetworkIdStore, NetworkMetadata, NetworkSettings,
    compute_fingerprint, dapp_url,
};
use crate::remote::{NetworkTable, RemoteControl, RemoteNetworkId};

pub use self::scheduler::{RetryScheduler, SharedReconciler};

/// Settings and fingerprint for the current configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub settings: NetworkSettings,
    pub fingerprint: Fingerprint,
}

/// Whether the attempt switched networks or found the app already on ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    AlreadyConnected,
}

/// Successful end of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub network_id: RemoteNetworkId,
    pub fingerprint: Fingerprint,
    pub freshness: Freshness,
    /// The network was added to the Status app during this attempt.
    pub created: bool,
}

impl Connection {
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

/// Retryable end of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{diagnostic}")]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub diagnostic: String,
}

impl AttemptFailure {
    fn new(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Result of one reconciliation attempt.
pub type AttemptOutcome = Result<Connection, AttemptFailure>;

/// States of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    Probing,
    Creating,
    ConnectingCached(RemoteNetworkId),
    ConnectingDiscovered(RemoteNetworkId),
    Connected(Connection),
    Failed(AttemptFailure),
}

impl ReconcileState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Creating => "creating",
            Self::ConnectingCached(_) => "connecting_cached",
            Self::ConnectingDiscovered(_) => "connecting_discovered",
            Self::Connected(_) => "connected",
            Self::Failed(_) => "failed",
        }
    }
}

/// Per-attempt scratch state.
struct Attempt {
    identity: NetworkIdentity,
    cached: Option<RemoteNetworkId>,
    stale_fallback_used: bool,
}

/// Drives the Status app toward this machine's network.
pub struct Reconciler {
    remote: Arc<dyn RemoteControl>,
    store: NetworkIdStore,
    policy: ReconcilePolicy,
    plugin: PluginConfig,
    device_ip: String,
    chain: ChainConfig,
    webserver: WebServerConfig,
    network_id: u64,
    lan: LanResolver,
    identity: Option<NetworkIdentity>,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteControl>,
        store: NetworkIdStore,
        config: &Config,
        network_id: u64,
        lan: LanResolver,
    ) -> Self {
        Self {
            remote,
            store,
            policy: config.reconcile.policy,
            plugin: config.plugin.clone(),
            device_ip: config.device.ip.clone(),
            chain: config.chain.clone(),
            webserver: config.webserver.clone(),
            network_id,
            lan,
            identity: None,
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteControl> {
        &self.remote
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin.name
    }

    pub fn device_ip(&self) -> &str {
        &self.device_ip
    }

    /// Replace the chain RPC settings. The identity is recomputed lazily.
    pub fn apply_blockchain_config(&mut self, chain: ChainConfig) {
        if self.chain != chain {
            tracing::debug!("Blockchain config changed; recomputing network fingerprint");
            self.chain = chain;
            self.identity = None;
        }
    }

    /// Replace the webserver settings. The identity is recomputed lazily.
    pub fn apply_webserver_config(&mut self, webserver: WebServerConfig) {
        if self.webserver != webserver {
            tracing::debug!("Webserver config changed; recomputing network fingerprint");
            self.webserver = webserver;
            self.identity = None;
        }
    }

    pub fn set_network_id(&mut self, network_id: u64) {
        if self.network_id != network_id {
            self.network_id = network_id;
            self.identity = None;
        }
    }

    /// Network settings and fingerprint, computed on first use after a change.
    pub fn identity(&mut self) -> Result<&NetworkIdentity, ConfigError> {
        let identity = match self.identity.take() {
            Some(identity) => identity,
            None => {
                let settings = NetworkSettings::resolve(
                    &self.plugin.name,
                    &self.chain,
                    self.network_id,
                    &self.lan,
                )?;
                let fingerprint = compute_fingerprint(&settings, &self.metadata());
                tracing::debug!(
                    "Network {} at {} has fingerprint {}",
                    settings.network_name,
                    settings.node_url,
                    fingerprint
                );
                NetworkIdentity {
                    settings,
                    fingerprint,
                }
            }
        };
        Ok(self.identity.insert(identity))
    }

    pub fn dapp_url(&self) -> Result<String, ConfigError> {
        dapp_url(&self.plugin, &self.webserver, &self.lan)
    }

    fn metadata(&self) -> NetworkMetadata {
        let mut metadata = self.plugin.metadata.clone();
        metadata.insert(
            DEVICE_IP_METADATA_KEY.to_string(),
            serde_json::Value::String(self.device_ip.clone()),
        );
        metadata
    }

    /// Run one attempt to completion.
    pub async fn reconcile(&mut self) -> AttemptOutcome {
        let identity = match self.identity() {
            Ok(identity) => identity.clone(),
            Err(e) => {
                return Err(AttemptFailure::new(
                    FailureKind::InvalidSettings,
                    format!("Cannot describe the local network to the Status app: {e}"),
                ));
            }
        };
        let mut attempt = Attempt {
            identity,
            cached: None,
            stale_fallback_used: false,
        };

        let mut state = ReconcileState::Idle;
        loop {
            state = match state {
                ReconcileState::Idle => self.on_idle().await,
                ReconcileState::Probing => self.on_probing(&mut attempt).await,
                ReconcileState::Creating => self.on_creating(&attempt).await,
                ReconcileState::ConnectingCached(id) => self.on_connecting(&mut attempt, id).await,
                ReconcileState::ConnectingDiscovered(id) => {
                    self.on_connecting(&mut attempt, id).await
                }
                ReconcileState::Connected(connection) => {
                    self.log_connected(&attempt.identity, &connection);
                    return Ok(connection);
                }
                ReconcileState::Failed(failure) => return Err(failure),
            };
            tracing::debug!("Reconcile -> {}", state.name());
        }
    }

    async fn on_idle(&self) -> ReconcileState {
        if self.remote.ping().await {
            ReconcileState::Probing
        } else {
            ReconcileState::Failed(AttemptFailure::new(
                FailureKind::RemoteUnreachable,
                format!(
                    "remote app unreachable: failed to reach the Status app at {}. Is the Status app open?",
                    self.device_ip
                ),
            ))
        }
    }

    async fn on_probing(&self, attempt: &mut Attempt) -> ReconcileState {
        attempt.cached = self.store.get(&attempt.identity.fingerprint).await;

        if self.policy == ReconcilePolicy::CacheFirst {
            return Self::from_cache(attempt.cached.clone());
        }

        match self.remote.list_networks().await {
            Ok(table) => self.from_table(attempt, &table).await,
            Err(e) if e.is_unreachable() => ReconcileState::Failed(AttemptFailure::new(
                e.kind(),
                "Failed to list networks in the Status app. Is the Status app open?",
            )),
            Err(e) => {
                tracing::debug!("Cannot list networks ({}); falling back to the cached id", e);
                Self::from_cache(attempt.cached.clone())
            }
        }
    }

    fn from_cache(cached: Option<RemoteNetworkId>) -> ReconcileState {
        match cached {
            Some(id) => ReconcileState::ConnectingCached(id),
            None => ReconcileState::Creating,
        }
    }

    async fn from_table(&self, attempt: &Attempt, table: &NetworkTable) -> ReconcileState {
        let settings = &attempt.identity.settings;
        // Prefer the active entry, then the one we already know.
        let found = table
            .iter()
            .filter(|(_, network)| {
                network.matches(
                    &settings.network_name,
                    &settings.node_url,
                    settings.network_id,
                )
            })
            .max_by_key(|(id, network)| (network.active, Some(*id) == attempt.cached.as_ref()));

        match found {
            Some((id, network)) => {
                if attempt.cached.as_ref() != Some(id) {
                    self.persist(&attempt.identity.fingerprint, id).await;
                }
                if network.active {
                    ReconcileState::Connected(Connection {
                        network_id: id.clone(),
                        fingerprint: attempt.identity.fingerprint.clone(),
                        freshness: Freshness::AlreadyConnected,
                        created: false,
                    })
                } else {
                    ReconcileState::ConnectingDiscovered(id.clone())
                }
            }
            None => match attempt.cached {
                Some(ref id) if table.contains_key(id) => ReconcileState::ConnectingCached(id.clone()),
                _ => ReconcileState::Creating,
            },
        }
    }

    async fn on_creating(&self, attempt: &Attempt) -> ReconcileState {
        let settings = &attempt.identity.settings;
        let added = self
            .remote
            .add_network(
                &settings.network_name,
                &settings.node_url,
                &settings.chain_name,
                settings.network_id,
            )
            .await;

        let id = match added {
            Ok(id) => id,
            Err(e) => return ReconcileState::Failed(self.add_failure(settings, &e)),
        };
        tracing::debug!("Added network {} to the Status app as {}", settings.network_name, id);

        self.persist(&attempt.identity.fingerprint, &id).await;

        match self.remote.connect(&id).await {
            Ok(_) => ReconcileState::Connected(Connection {
                network_id: id,
                fingerprint: attempt.identity.fingerprint.clone(),
                freshness: Freshness::Fresh,
                created: true,
            }),
            Err(e) => ReconcileState::Failed(self.connect_failure(settings, &e)),
        }
    }

    async fn on_connecting(&self, attempt: &mut Attempt, id: RemoteNetworkId) -> ReconcileState {
        match self.remote.connect(&id).await {
            Ok(_) => ReconcileState::Connected(Connection {
                network_id: id,
                fingerprint: attempt.identity.fingerprint.clone(),
                freshness: Freshness::Fresh,
                created: false,
            }),
            Err(RemoteError::UnknownNetwork { .. }) if !attempt.stale_fallback_used => {
                attempt.stale_fallback_used = true;
                tracing::info!(
                    "Network {} no longer exists in the Status app; adding it again",
                    id
                );
                ReconcileState::Creating
            }
            Err(e) => ReconcileState::Failed(self.connect_failure(&attempt.identity.settings, &e)),
        }
    }

    /// Best-effort write; a failure never blocks the attempt.
    async fn persist(&self, fingerprint: &Fingerprint, id: &RemoteNetworkId) {
        if let Err(e) = self.store.put(fingerprint, id).await {
            tracing::warn!(
                "[{}] Could not save network id {}: {}",
                FailureKind::StorageError,
                id,
                e
            );
        }
    }

    fn add_failure(&self, settings: &NetworkSettings, error: &RemoteError) -> AttemptFailure {
        let diagnostic = match error {
            RemoteError::MalformedResponse { reason, .. } => {
                format!("Status app returned a bad response ({reason}), could not connect.")
            }
            e if e.is_unreachable() => {
                "Failed to add a network to the Status app. Is the Status app open?".to_string()
            }
            e => format!(
                "Error while adding network {} (name: {}, networkId: {}) to the Status app: {}.",
                settings.node_url,
                settings.chain_name,
                settings.network_id,
                e.remote_message().trim_end_matches('.')
            ),
        };
        AttemptFailure::new(error.kind(), diagnostic)
    }

    fn connect_failure(&self, settings: &NetworkSettings, error: &RemoteError) -> AttemptFailure {
        let diagnostic = match error {
            RemoteError::MalformedResponse { reason, .. } => {
                format!("Status app returned a bad response ({reason}), could not connect.")
            }
            e if e.is_unreachable() => {
                "Failed to connect to the Status network. Is the Status app open?".to_string()
            }
            e => format!(
                "Error while connecting to Status network {} in the Status app: {}.",
                settings.node_url,
                e.remote_message().trim_end_matches('.')
            ),
        };
        AttemptFailure::new(error.kind(), diagnostic)
    }

    fn log_connected(&self, identity: &NetworkIdentity, connection: &Connection) {
        match connection.freshness {
            Freshness::Fresh => tracing::info!(
                "Connected the Status app to {} ({}) as network {}",
                identity.settings.network_name,
                identity.settings.node_url,
                connection.network_id
            ),
            Freshness::AlreadyConnected => tracing::info!(
                "Status app is already connected to {} ({})",
                identity.settings.network_name,
                connection.network_id
            ),
        }
    }
}
