//! The long-running `statuslink run` service.
//!
//! Startup order: Status client, service checks, chain readiness, network id
//! store, reconciler, retry scheduler. After the first successful attempt the
//! dApp is opened in the Status browser once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::chain::{ChainProbe, RpcChainProbe, wait_for_chain};
use crate::config::{Config, ReconcileConfig};
use crate::error::Error;
use crate::network::{LanResolver, NetworkIdStore, system_lan_resolver};
use crate::reconcile::{Connection, Reconciler, RetryScheduler, SharedReconciler};
use crate::remote::health::run_service_checks;
use crate::remote::{RemoteControl, StatusClient};

/// Pause between pings while the Status app restarts after a network switch.
const RESTART_PROBE_PERIOD: Duration = Duration::from_secs(1);

/// External collaborators of the service.
pub struct Services {
    pub remote: Arc<dyn RemoteControl>,
    pub chain: Arc<dyn ChainProbe>,
    pub lan: LanResolver,
}

impl Services {
    /// HTTP-backed collaborators for a resolved config.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Ok(Self {
            remote: Arc::new(StatusClient::new(&config.device)?),
            chain: Arc::new(RpcChainProbe::new(&config.chain, config.device.timeout)?),
            lan: system_lan_resolver(),
        })
    }
}

/// Connect the Status app to the local network and open the dApp.
///
/// `reloads` delivers re-read configuration; only the chain and webserver
/// sections are applied while reconciliation is pending. Service checks keep
/// running in the background after this returns.
pub async fn run(
    config: Config,
    services: Services,
    reloads: mpsc::Receiver<Config>,
) -> Result<Connection, Error> {
    tracing::info!(
        "Connecting to the Status app at {}:{}",
        config.device.ip,
        config.device.port
    );
    tracing::info!(
        "Add {} to the CORS origins of the node and webserver",
        config.cors_origin()
    );

    if let Some(period) = config.reconcile.service_check_interval {
        tokio::spawn(run_service_checks(
            Arc::clone(&services.remote),
            config.device.ip.clone(),
            period,
        ));
    }

    let network_id = wait_for_chain(
        services.chain.as_ref(),
        config.chain.network_id,
        config.reconcile.interval,
    )
    .await;

    let store = NetworkIdStore::new(&config.plugin.state_dir);
    let mut reconciler = Reconciler::new(
        Arc::clone(&services.remote),
        store.clone(),
        &config,
        network_id,
        services.lan,
    );
    match reconciler.identity() {
        Ok(identity) => {
            let fingerprint = identity.fingerprint.clone();
            store.migrate_legacy(&fingerprint).await;
        }
        Err(e) => tracing::warn!("Network settings are incomplete: {}", e),
    }

    let scheduler = RetryScheduler::new(reconciler, config.reconcile.interval);
    let handle = scheduler.handle();
    let reload_task = tokio::spawn(apply_reloads(handle.clone(), reloads));

    let connection = scheduler
        .run(|connection| {
            tracing::debug!(
                "Status app on network {} (fingerprint {})",
                connection.network_id,
                connection.fingerprint
            );
        })
        .await;
    reload_task.abort();

    open_dapp_after_connect(&handle, &connection, &config.reconcile).await;
    Ok(connection)
}

async fn apply_reloads(reconciler: SharedReconciler, mut reloads: mpsc::Receiver<Config>) {
    while let Some(config) = reloads.recv().await {
        let mut reconciler = reconciler.lock().await;
        if let Some(network_id) = config.chain.network_id {
            reconciler.set_network_id(network_id);
        }
        reconciler.apply_blockchain_config(config.chain);
        reconciler.apply_webserver_config(config.webserver);
        tracing::info!("Applied reloaded chain and webserver configuration");
    }
}

/// Open the dApp once after reconciliation.
///
/// A fresh network switch restarts the Status app, so wait for it to answer
/// ping again before sending the command.
async fn open_dapp_after_connect(
    reconciler: &SharedReconciler,
    connection: &Connection,
    settings: &ReconcileConfig,
) {
    let (remote, name, url) = {
        let reconciler = reconciler.lock().await;
        (
            Arc::clone(reconciler.remote()),
            reconciler.plugin_name().to_string(),
            reconciler.dapp_url(),
        )
    };
    let url = match url {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Cannot build the dApp URL for {}: {}", name, e);
            return;
        }
    };

    if connection.is_fresh() {
        if !wait_for_restart(remote.as_ref(), settings.restart_probe_attempts).await {
            tracing::error!("Failed to open {} in the Status app. Is the Status app open?", name);
            return;
        }
    } else if !settings.open_dapp_when_already_connected {
        tracing::debug!("Already connected; not opening {}", name);
        return;
    }

    tracing::info!("Opening {} ({}) in the Status browser...", name, url);
    match remote.open_dapp(&url).await {
        Ok(()) => tracing::info!("{} opened successfully.", name),
        Err(e) if e.is_unreachable() => {
            tracing::error!("Failed to open {} in the Status app. Is the Status app open?", name);
        }
        Err(e) => tracing::error!(
            "Error opening {} in the Status app: {}.",
            name,
            e.remote_message().trim_end_matches('.')
        ),
    }
}

async fn wait_for_restart(remote: &dyn RemoteControl, attempts: u32) -> bool {
    for attempt in 0..attempts.max(1) {
        if attempt > 0 {
            tokio::time::sleep(RESTART_PROBE_PERIOD).await;
        }
        if remote.ping().await {
            return true;
        }
    }
    false
}
