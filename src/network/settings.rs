use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{ChainConfig, PluginConfig, WebServerConfig};
use crate::error::ConfigError;

/// Prefix of the network display name in the Status app.
pub const NETWORK_NAME: &str = "Embark";
/// Default symbolic chain name sent with new networks.
pub const CHAIN_NAME: &str = "embark";

/// Bind addresses the phone cannot reach.
const LOCAL_HOSTS: &[&str] = &["0.0.0.0", "localhost", "127.0.0.1", "::", "::1"];

/// Source of this machine's LAN address.
pub type LanResolver = Arc<dyn Fn() -> Option<IpAddr> + Send + Sync>;

/// Resolver backed by the operating system's routing table.
pub fn system_lan_resolver() -> LanResolver {
    Arc::new(|| local_ip_address::local_ip().ok())
}

/// Everything the Status app needs to add this network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSettings {
    pub network_name: String,
    pub node_url: String,
    pub chain_name: String,
    pub network_id: u64,
}

impl NetworkSettings {
    /// Build settings from chain configuration. Local-only bind hosts are
    /// replaced with the LAN address so the phone can reach the node.
    pub fn resolve(
        plugin_name: &str,
        chain: &ChainConfig,
        network_id: u64,
        lan: &LanResolver,
    ) -> Result<Self, ConfigError> {
        let host = routable_host(&chain.rpc_host, lan);
        Ok(Self {
            network_name: network_display_name(plugin_name),
            node_url: build_url("http", &host, Some(chain.node_port()))?,
            chain_name: chain.chain_name.clone(),
            network_id,
        })
    }
}

/// Display name of the network for a dApp.
pub fn network_display_name(plugin_name: &str) -> String {
    format!("{NETWORK_NAME} ({plugin_name})")
}

pub fn is_local_host(host: &str) -> bool {
    let host = host.trim().trim_matches(['[', ']']);
    LOCAL_HOSTS.iter().any(|local| host.eq_ignore_ascii_case(local))
}

/// Rewrite local-only hosts to the LAN address. The host is kept as-is when
/// no LAN address can be found.
pub fn routable_host(host: &str, lan: &LanResolver) -> String {
    if !is_local_host(host) {
        return host.to_string();
    }
    match lan() {
        Some(ip) => ip.to_string(),
        None => {
            tracing::warn!(
                "Could not determine a LAN address; '{}' will not be reachable from the phone",
                host
            );
            host.to_string()
        }
    }
}

/// Build `protocol://host[:port]`. The host is required; IPv6 literals are
/// bracketed.
pub fn build_url(protocol: &str, host: &str, port: Option<u16>) -> Result<String, ConfigError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "host".to_string(),
            message: "a host is required to build a URL".to_string(),
        });
    }
    let protocol = if protocol.is_empty() { "http" } else { protocol };
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    Ok(match port {
        Some(port) => format!("{protocol}://{host}:{port}"),
        None => format!("{protocol}://{host}"),
    })
}

/// URL the Status browser should open: the configured override, or the
/// webserver address with a trailing slash.
pub fn dapp_url(
    plugin: &PluginConfig,
    webserver: &WebServerConfig,
    lan: &LanResolver,
) -> Result<String, ConfigError> {
    if let Some(ref url) = plugin.dapp_url {
        return Ok(url.clone());
    }
    let host = routable_host(&webserver.host, lan);
    Ok(format!("{}/", build_url("http", &host, Some(webserver.port))?))
}
