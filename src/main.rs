use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use statuslink::app::{self, Services};
use statuslink::cli::{self, Cli, Command, doctor};
use statuslink::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = cli.config.clone();
    let load = || Config::from_env_with_toml(config_path.as_deref());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_service(load()?, cli.config).await,
        Command::Ping => cli::run_ping(&load()?).await,
        Command::Networks { json } => cli::run_networks(&load()?, json).await,
        Command::Remove { id } => cli::run_remove(&load()?, &id).await,
        Command::Fingerprint { network_id } => cli::run_fingerprint(&load()?, network_id).await,
        Command::Open { url } => cli::run_open(&load()?, url).await,
        Command::Init {
            device_ip,
            dapp_path,
        } => cli::run_init(&device_ip, dapp_path.as_deref()),
        Command::Doctor { strict } => doctor::run_doctor_command(config_path.as_deref(), strict).await,
    }
}

fn init_tracing(log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("statuslink=info"));
    let json = log_json
        || std::env::var("STATUSLINK_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_service(config: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let keep_checking = config.reconcile.service_check_interval.is_some();
    let services = Services::from_config(&config)?;
    let (reload_tx, reload_rx) = mpsc::channel(4);
    spawn_reload_listener(config_path, reload_tx);

    tokio::select! {
        result = app::run(config, services, reload_rx) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted before the Status app was connected");
            return Ok(());
        }
    }

    if keep_checking {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
    }
    Ok(())
}

/// Re-read configuration on SIGHUP and hand it to the running service.
#[cfg(unix)]
fn spawn_reload_listener(config_path: Option<PathBuf>, reloads: mpsc::Sender<Config>) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                tracing::warn!("Config reload on SIGHUP unavailable: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match Config::from_env_with_toml(config_path.as_deref()) {
                Ok(config) => {
                    if reloads.send(config).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Ignoring config reload: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_config_path: Option<PathBuf>, _reloads: mpsc::Sender<Config>) {}
