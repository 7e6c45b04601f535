//! User settings persistence.
//!
//! Settings live in `~/.statuslink/config.toml` (or the path given with
//! `--config`). Values are resolved with env var > config file > default
//! priority by [`crate::config::Config`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings read from the TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// The phone running the Status app.
    #[serde(default)]
    pub device: DeviceSettings,

    /// The local chain node the phone should connect to.
    #[serde(default)]
    pub chain: ChainSettings,

    /// The webserver serving the dApp.
    #[serde(default)]
    pub webserver: WebServerSettings,

    /// Plugin identity and extra fingerprint metadata.
    #[serde(default)]
    pub plugin: PluginSettings,

    /// Retry scheduler and reconciliation behavior.
    #[serde(default)]
    pub reconcile: ReconcileSettings,
}

/// Status app device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// LAN address of the phone.
    #[serde(default)]
    pub ip: Option<String>,

    /// Port of the Status development API.
    #[serde(default = "default_device_port")]
    pub port: u16,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_device_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_device_port() -> u16 {
    5561
}

fn default_device_timeout_ms() -> u64 {
    3_000
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            ip: None,
            port: default_device_port(),
            timeout_ms: default_device_timeout_ms(),
        }
    }
}

/// Local chain node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Host the node's RPC endpoint binds to.
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,

    /// Port of the node's RPC endpoint.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Whether RPC traffic goes through the development proxy (node port + 10).
    #[serde(default)]
    pub proxy: bool,

    /// Symbolic chain name sent to the Status app.
    #[serde(default = "default_chain_name")]
    pub chain_name: String,

    /// Pin the numeric network id instead of asking the node.
    #[serde(default)]
    pub network_id: Option<u64>,
}

fn default_rpc_host() -> String {
    "localhost".to_string()
}

fn default_rpc_port() -> u16 {
    8545
}

fn default_chain_name() -> String {
    "embark".to_string()
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_host: default_rpc_host(),
            rpc_port: default_rpc_port(),
            proxy: false,
            chain_name: default_chain_name(),
            network_id: None,
        }
    }
}

/// dApp webserver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebServerSettings {
    #[serde(default = "default_webserver_host")]
    pub host: String,

    #[serde(default = "default_webserver_port")]
    pub port: u16,
}

fn default_webserver_host() -> String {
    "localhost".to_string()
}

fn default_webserver_port() -> u16 {
    8000
}

impl Default for WebServerSettings {
    fn default() -> Self {
        Self {
            host: default_webserver_host(),
            port: default_webserver_port(),
        }
    }
}

/// Plugin identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// dApp name shown in the Status network list and log lines.
    #[serde(default = "default_plugin_name")]
    pub name: String,

    /// Open this URL instead of the webserver address.
    #[serde(default)]
    pub dapp_url: Option<String>,

    /// Root of the dApp project; the state directory lives beneath it.
    #[serde(default)]
    pub dapp_path: Option<PathBuf>,

    /// Explicit directory for cached network ids.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Extra values that distinguish this network from others on the same
    /// machine. Every entry feeds the network fingerprint.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_plugin_name() -> String {
    "dapp".to_string()
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            name: default_plugin_name(),
            dapp_url: None,
            dapp_path: None,
            state_dir: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Fixed period between attempts in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// "discovery_first" or "cache_first".
    #[serde(default = "default_policy")]
    pub policy: String,

    /// Still open the dApp when the network was already active.
    #[serde(default = "default_true")]
    pub open_dapp_when_already_connected: bool,

    /// How many pings to wait for the Status app to come back after a
    /// network switch before opening the dApp anyway.
    #[serde(default = "default_restart_probe_attempts")]
    pub restart_probe_attempts: u32,

    /// Seconds between Status app service checks. 0 disables them.
    #[serde(default = "default_service_check_secs")]
    pub service_check_secs: u64,
}

fn default_interval_ms() -> u64 {
    4_000
}

fn default_policy() -> String {
    "discovery_first".to_string()
}

fn default_true() -> bool {
    true
}

fn default_restart_probe_attempts() -> u32 {
    10
}

fn default_service_check_secs() -> u64 {
    10
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            policy: default_policy(),
            open_dapp_when_already_connected: default_true(),
            restart_probe_attempts: default_restart_probe_attempts(),
            service_check_secs: default_service_check_secs(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.statuslink/config.toml).
    pub fn default_toml_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".statuslink")
            .join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &std::path::Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }
}
