//! `statuslink doctor` - active health diagnostics.
//!
//! Validates configuration and probes the phone and the local chain so
//! connection problems surface before `statuslink run` retries forever.

use std::path::Path;
use std::time::Duration;

use crate::chain::{ChainProbe, RpcChainProbe};
use crate::config::Config;
use crate::network::is_local_host;
use crate::remote::health::{ServiceState, service_check};
use crate::remote::{RemoteControl, StatusClient};

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(config_path: Option<&Path>, strict: bool) -> anyhow::Result<()> {
    println!("statuslink doctor");
    println!("=================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    let config = Config::from_env_with_toml(config_path);

    check(
        "Configuration",
        match config {
            Ok(ref config) => CheckResult::Pass(format!(
                "device {}:{}, policy {}",
                config.device.ip,
                config.device.port,
                config.reconcile.policy.as_str()
            )),
            Err(ref e) => CheckResult::Fail(e.to_string()),
        },
        &mut passed,
        &mut failed,
    );

    if let Ok(ref config) = config {
        // ── Local checks ──────────────────────────────────────

        check(
            "State directory",
            check_state_dir(&config.plugin.state_dir),
            &mut passed,
            &mut failed,
        );

        check(
            "LAN address",
            check_lan_address(config),
            &mut passed,
            &mut failed,
        );

        // ── Remote checks ─────────────────────────────────────

        let client = StatusClient::new(&config.device);
        check(
            "Status app",
            match client {
                Ok(ref client) => check_status_app(client, &config.device.ip).await,
                Err(ref e) => CheckResult::Fail(e.to_string()),
            },
            &mut passed,
            &mut failed,
        );

        check(
            "Network listing",
            match client {
                Ok(ref client) => check_network_listing(client).await,
                Err(_) => CheckResult::Skip("no Status client".to_string()),
            },
            &mut passed,
            &mut failed,
        );

        check(
            "Chain RPC",
            check_chain(config, config.device.timeout).await,
            &mut passed,
            &mut failed,
        );
    }

    // ── Summary ───────────────────────────────────────────────

    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 {
        println!("\n  Fix the failed checks; `statuslink run` keeps retrying until they pass.");
        if strict {
            anyhow::bail!("doctor strict mode failed with {failed} check(s)");
        }
    }

    Ok(())
}

// ── Individual checks ───────────────────────────────────────

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_state_dir(dir: &Path) -> CheckResult {
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult::Fail(format!("cannot create {}: {e}", dir.display()));
    }
    let probe = dir.join(".statuslink-doctor");
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            CheckResult::Pass(format!("{} is writable", dir.display()))
        }
        Err(e) => CheckResult::Fail(format!("{} is not writable: {e}", dir.display())),
    }
}

fn check_lan_address(config: &Config) -> CheckResult {
    let needs_lan = is_local_host(&config.chain.rpc_host) || is_local_host(&config.webserver.host);
    if !needs_lan {
        return CheckResult::Skip("chain and webserver hosts are already routable".to_string());
    }
    match local_ip_address::local_ip() {
        Ok(ip) => CheckResult::Pass(format!("local hosts will be advertised as {ip}")),
        Err(e) => CheckResult::Fail(format!(
            "cannot determine a LAN address ({e}); set CHAIN_RPC_HOST and WEBSERVER_HOST to addresses the phone can reach"
        )),
    }
}

async fn check_status_app(remote: &dyn RemoteControl, device_ip: &str) -> CheckResult {
    let status = service_check(remote, device_ip).await;
    match status.status {
        ServiceState::On => CheckResult::Pass(format!("{} answered", status.name)),
        ServiceState::Off => CheckResult::Fail(format!(
            "{} did not answer. Is the Status app open and on the same network?",
            status.name
        )),
    }
}

async fn check_network_listing(remote: &dyn RemoteControl) -> CheckResult {
    match remote.list_networks().await {
        Ok(table) => CheckResult::Pass(format!("{} network(s) configured", table.len())),
        Err(e) if e.is_unreachable() => CheckResult::Skip("Status app unreachable".to_string()),
        Err(e) => CheckResult::Skip(format!(
            "not supported by this Status app ({e}); the cached network id will be used"
        )),
    }
}

async fn check_chain(config: &Config, timeout: Duration) -> CheckResult {
    let probe = match RpcChainProbe::new(&config.chain, timeout) {
        Ok(probe) => probe,
        Err(e) => return CheckResult::Fail(e.to_string()),
    };
    match probe.network_id().await {
        Ok(id) => match config.chain.network_id {
            Some(configured) if configured != id => CheckResult::Fail(format!(
                "node reports network id {id} but CHAIN_NETWORK_ID is {configured}"
            )),
            _ => CheckResult::Pass(format!("network id {id}")),
        },
        Err(e) => CheckResult::Fail(format!("{e}; is the chain running?")),
    }
}
