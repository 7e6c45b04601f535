//! Command-line interface.

pub mod doctor;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::chain::{ChainProbe, RpcChainProbe};
use crate::config::Config;
use crate::network::{NetworkIdStore, dapp_url, system_lan_resolver};
use crate::reconcile::Reconciler;
use crate::remote::health::{ServiceState, service_check};
use crate::remote::{RemoteControl, RemoteNetworkId, StatusClient};

#[derive(Parser, Debug)]
#[command(
    name = "statuslink",
    version,
    about = "Connect a local development chain to the Status mobile app"
)]
pub struct Cli {
    /// TOML config file (default: ~/.statuslink/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect the Status app to the local chain and open the dApp (default)
    Run,

    /// Check whether the Status app answers
    Ping,

    /// List the networks configured in the Status app
    Networks {
        /// Print the raw table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a network from the Status app
    Remove {
        /// Network id as shown by `statuslink networks`
        #[arg(long)]
        id: String,
    },

    /// Print the network settings and fingerprint for the current config
    Fingerprint {
        /// Use this network id instead of asking the chain
        #[arg(long)]
        network_id: Option<u64>,
    },

    /// Open the dApp in the Status browser
    Open {
        /// URL to open instead of the configured dApp URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Save the phone's address to ~/.statuslink/.env
    Init {
        /// LAN address of the phone running the Status app
        #[arg(long)]
        device_ip: String,

        /// Root of the dApp project
        #[arg(long)]
        dapp_path: Option<PathBuf>,
    },

    /// Check configuration, state directory, Status app and chain
    Doctor {
        /// Exit non-zero when any check fails
        #[arg(long)]
        strict: bool,
    },
}

pub async fn run_ping(config: &Config) -> anyhow::Result<()> {
    let client = StatusClient::new(&config.device)?;
    let status = service_check(&client, &config.device.ip).await;
    println!("{}: {}", status.name, status.status.as_str());
    if status.status == ServiceState::Off {
        anyhow::bail!(
            "Status app at {} did not answer. Is the Status app open?",
            client.endpoint()
        );
    }
    Ok(())
}

pub async fn run_networks(config: &Config, json: bool) -> anyhow::Result<()> {
    let client = StatusClient::new(&config.device)?;
    let table = client.list_networks().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    if table.is_empty() {
        println!("No networks configured in the Status app.");
        return Ok(());
    }
    for (id, network) in &table {
        let marker = if network.active { "*" } else { " " };
        let network_id = network
            .network_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{marker} {:<48} {:<32} {network_id:>8} {}",
            id.as_str(),
            network.name,
            network.upstream_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn run_remove(config: &Config, id: &str) -> anyhow::Result<()> {
    let id = RemoteNetworkId::new(id).ok_or_else(|| anyhow::anyhow!("network id is empty"))?;
    let client = StatusClient::new(&config.device)?;
    client.remove_network(&id).await?;
    println!("Removed network {id} from the Status app.");
    Ok(())
}

pub async fn run_fingerprint(config: &Config, network_id: Option<u64>) -> anyhow::Result<()> {
    let network_id = match network_id.or(config.chain.network_id) {
        Some(id) => id,
        None => RpcChainProbe::new(&config.chain, config.device.timeout)?
            .network_id()
            .await?,
    };

    let remote: Arc<dyn RemoteControl> = Arc::new(StatusClient::new(&config.device)?);
    let store = NetworkIdStore::new(&config.plugin.state_dir);
    let mut reconciler = Reconciler::new(
        remote,
        store.clone(),
        config,
        network_id,
        system_lan_resolver(),
    );
    let identity = reconciler.identity()?.clone();
    let cached = store.get(&identity.fingerprint).await;

    println!("network name:  {}", identity.settings.network_name);
    println!("node url:      {}", identity.settings.node_url);
    println!("chain:         {}", identity.settings.chain_name);
    println!("network id:    {}", identity.settings.network_id);
    println!("fingerprint:   {}", identity.fingerprint);
    println!("cache file:    {}", store.path_for(&identity.fingerprint).display());
    match cached {
        Some(id) => println!("cached id:     {id}"),
        None => println!("cached id:     (none)"),
    }
    Ok(())
}

pub async fn run_open(config: &Config, url: Option<String>) -> anyhow::Result<()> {
    let url = match url {
        Some(url) => url,
        None => dapp_url(&config.plugin, &config.webserver, &system_lan_resolver())?,
    };
    let client = StatusClient::new(&config.device)?;
    client.open_dapp(&url).await?;
    println!("Opened {url} in the Status browser.");
    Ok(())
}

pub fn run_init(device_ip: &str, dapp_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let dapp_path = dapp_path.map(|p| p.display().to_string());
    let mut vars = vec![("STATUS_DEVICE_IP", device_ip)];
    if let Some(ref path) = dapp_path {
        vars.push(("DAPP_PATH", path.as_str()));
    }
    crate::bootstrap::save_bootstrap_env(&vars)?;
    println!(
        "Saved to {}",
        crate::bootstrap::statuslink_env_path().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::ReconcilePolicy;
    use crate::reconcile::tests::test_config;

    fn config_for(server: &MockServer, state_dir: &std::path::Path) -> Config {
        let address = server.address();
        let mut config = test_config(state_dir, ReconcilePolicy::DiscoveryFirst);
        config.device.ip = address.ip().to_string();
        config.device.port = address.port();
        config
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["statuslink"]).unwrap();
        assert_eq!(cli.command, None);

        let cli = Cli::try_parse_from(["statuslink", "--log-json", "remove", "--id", "abc123"])
            .unwrap();
        assert!(cli.log_json);
        assert_eq!(
            cli.command,
            Some(Command::Remove {
                id: "abc123".to_string()
            })
        );

        let cli =
            Cli::try_parse_from(["statuslink", "fingerprint", "--network-id", "1337"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Fingerprint {
                network_id: Some(1337)
            })
        );

        assert!(Cli::try_parse_from(["statuslink", "remove"]).is_err());
    }

    #[tokio::test]
    async fn ping_fails_when_app_is_silent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();

        assert!(run_ping(&config_for(&server, dir.path())).await.is_err());
    }

    #[tokio::test]
    async fn remove_sends_delete() {
        let server = MockServer::start().await;
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
        let dir = tempdir().unwrap();

        run_remove(&config_for(&server, dir.path()), "abc123")
            .await
            .unwrap();
        assert!(run_remove(&config_for(&server, dir.path()), "  ").await.is_err());
    }

    #[tokio::test]
    async fn networks_lists_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/networks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"networks": {}})))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let config = config_for(&server, dir.path());

        run_networks(&config, false).await.unwrap();
        run_networks(&config, true).await.unwrap();
    }
}
