//! Configuration for statuslink.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! `./.env` and `~/.statuslink/.env` are loaded via dotenvy early in startup
//! and never override variables already present in the environment.

pub(crate) mod helpers;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::network::build_url;
use crate::settings::Settings;

use self::helpers::{optional_bool_env, optional_env, parse_optional_env};

/// Where the cached network ids live relative to the dApp root.
const STATE_SUBDIR: [&str; 2] = [".embark", "embark-status"];

/// Metadata key filled in from the device address; not settable by users.
pub const DEVICE_IP_METADATA_KEY: &str = "device.ip";

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub chain: ChainConfig,
    pub webserver: WebServerConfig,
    pub plugin: PluginConfig,
    pub reconcile: ReconcileConfig,
}

/// The phone running the Status app.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub ip: String,
    pub port: u16,
    pub timeout: Duration,
}

impl DeviceConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let ip = optional_env("STATUS_DEVICE_IP")?
            .or_else(|| settings.device.ip.clone())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "STATUS_DEVICE_IP".to_string(),
                hint: "Set it (or device.ip in config.toml) to the LAN address of the phone \
                       running the Status app."
                    .to_string(),
            })?;

        let port = parse_optional_env("STATUS_DEVICE_PORT", "a valid port number")?
            .unwrap_or(settings.device.port);

        let timeout_ms = parse_optional_env("STATUS_TIMEOUT_MS", "a positive integer")?
            .unwrap_or(settings.device.timeout_ms);
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STATUS_TIMEOUT_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            ip,
            port,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Base URL of the Status development API.
    pub fn base_url(&self) -> Result<String, ConfigError> {
        build_url("http", &self.ip, Some(self.port))
    }
}

/// The local chain node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub rpc_host: String,
    pub rpc_port: u16,
    pub proxy: bool,
    pub chain_name: String,
    pub network_id: Option<u64>,
}

impl ChainConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let rpc_host = optional_env("CHAIN_RPC_HOST")?
            .unwrap_or_else(|| settings.chain.rpc_host.clone());
        if rpc_host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CHAIN_RPC_HOST".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let rpc_port = parse_optional_env("CHAIN_RPC_PORT", "a valid port number")?
            .unwrap_or(settings.chain.rpc_port);

        let proxy = optional_bool_env("CHAIN_PROXY")?.unwrap_or(settings.chain.proxy);

        let chain_name =
            optional_env("CHAIN_NAME")?.unwrap_or_else(|| settings.chain.chain_name.clone());

        let network_id = parse_optional_env("CHAIN_NETWORK_ID", "a non-negative integer")?
            .or(settings.chain.network_id);

        Ok(Self {
            rpc_host: rpc_host.trim().to_string(),
            rpc_port,
            proxy,
            chain_name,
            network_id,
        })
    }

    /// Port the phone should talk to. The development proxy listens ten
    /// ports above the node.
    pub fn node_port(&self) -> u16 {
        if self.proxy {
            self.rpc_port.saturating_add(10)
        } else {
            self.rpc_port
        }
    }

    /// URL this machine uses to reach the node's RPC endpoint.
    pub fn local_rpc_url(&self) -> Result<String, ConfigError> {
        let host = match self.rpc_host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" => "::1",
            other => other,
        };
        build_url("http", host, Some(self.rpc_port))
    }
}

/// The webserver serving the dApp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
}

impl WebServerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            host: optional_env("WEBSERVER_HOST")?
                .unwrap_or_else(|| settings.webserver.host.clone()),
            port: parse_optional_env("WEBSERVER_PORT", "a valid port number")?
                .unwrap_or(settings.webserver.port),
        })
    }
}

/// Plugin identity and persisted-state location.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    pub name: String,
    pub dapp_url: Option<String>,
    pub state_dir: PathBuf,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PluginConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let name =
            optional_env("STATUS_PLUGIN_NAME")?.unwrap_or_else(|| settings.plugin.name.clone());

        let dapp_url = optional_env("STATUS_DAPP_URL")?.or_else(|| settings.plugin.dapp_url.clone());
        if let Some(ref url) = dapp_url {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                key: "STATUS_DAPP_URL".to_string(),
                message: format!("must be an absolute URL: {e}"),
            })?;
        }

        let state_dir = match optional_env("STATUS_STATE_DIR")?
            .map(PathBuf::from)
            .or_else(|| settings.plugin.state_dir.clone())
        {
            Some(dir) => dir,
            None => {
                let root = optional_env("DAPP_PATH")?
                    .map(PathBuf::from)
                    .or_else(|| settings.plugin.dapp_path.clone())
                    .unwrap_or_else(|| PathBuf::from("."));
                STATE_SUBDIR.iter().fold(root, |path, part| path.join(part))
            }
        };

        if settings.plugin.metadata.contains_key(DEVICE_IP_METADATA_KEY) {
            return Err(ConfigError::InvalidValue {
                key: format!("plugin.metadata.{DEVICE_IP_METADATA_KEY}"),
                message: "reserved; it is always set from the device address".to_string(),
            });
        }

        Ok(Self {
            name,
            dapp_url,
            state_dir,
            metadata: settings.plugin.metadata.clone(),
        })
    }
}

/// Which source decides the remote network id during an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// List the remote networks first; the local cache is a fallback.
    DiscoveryFirst,
    /// Trust the local cache; list nothing.
    CacheFirst,
}

impl ReconcilePolicy {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "discovery" | "discovery_first" => Ok(Self::DiscoveryFirst),
            "cache" | "cache_first" => Ok(Self::CacheFirst),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'discovery_first' or 'cache_first', got '{value}'"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiscoveryFirst => "discovery_first",
            Self::CacheFirst => "cache_first",
        }
    }
}

/// Retry scheduler and follow-up behavior.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub interval: Duration,
    pub policy: ReconcilePolicy,
    pub open_dapp_when_already_connected: bool,
    pub restart_probe_attempts: u32,
    pub service_check_interval: Option<Duration>,
}

impl ReconcileConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let interval_ms = parse_optional_env("STATUS_CONNECT_INTERVAL_MS", "a positive integer")?
            .unwrap_or(settings.reconcile.interval_ms);
        if interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STATUS_CONNECT_INTERVAL_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let policy = ReconcilePolicy::parse(
            &optional_env("STATUS_RECONCILE_POLICY")?
                .unwrap_or_else(|| settings.reconcile.policy.clone()),
            "STATUS_RECONCILE_POLICY",
        )?;

        let open_dapp_when_already_connected = optional_bool_env("STATUS_OPEN_DAPP_WHEN_CONNECTED")?
            .unwrap_or(settings.reconcile.open_dapp_when_already_connected);

        let restart_probe_attempts =
            parse_optional_env("STATUS_RESTART_PROBE_ATTEMPTS", "a non-negative integer")?
                .unwrap_or(settings.reconcile.restart_probe_attempts);

        let service_check_secs: u64 =
            parse_optional_env("STATUS_SERVICE_CHECK_SECS", "a non-negative integer")?
                .unwrap_or(settings.reconcile.service_check_secs);

        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            policy,
            open_dapp_when_already_connected,
            restart_probe_attempts,
            service_check_interval: (service_check_secs > 0)
                .then(|| Duration::from_secs(service_check_secs)),
        })
    }
}

fn normalize_variant(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

impl Config {
    /// Load configuration from environment variables and the default
    /// config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional TOML config file overlay.
    pub fn from_env_with_toml(toml_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_statuslink_env();

        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;
        Self::resolve(&settings)
    }

    /// Load a TOML config file into settings.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries `~/.statuslink/config.toml` (missing file is
    /// silently ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&std::path::Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(std::path::PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                *settings = toml_settings;
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    /// Resolve every section from settings plus env overrides.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let config = Self {
            device: DeviceConfig::resolve(settings)?,
            chain: ChainConfig::resolve(settings)?,
            webserver: WebServerConfig::resolve(settings)?,
            plugin: PluginConfig::resolve(settings)?,
            reconcile: ReconcileConfig::resolve(settings)?,
        };

        // A hung request must finish before the next tick is due.
        if config.device.timeout >= config.reconcile.interval {
            return Err(ConfigError::InvalidValue {
                key: "STATUS_TIMEOUT_MS".to_string(),
                message: format!(
                    "must be shorter than the connect interval ({} ms)",
                    config.reconcile.interval.as_millis()
                ),
            });
        }

        Ok(config)
    }

    /// Origin the node and webserver must allow for requests from the phone.
    pub fn cors_origin(&self) -> String {
        format!("http://{}", self.device.ip)
    }
}
