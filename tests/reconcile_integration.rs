//! End-to-end runs of the service against a mock Status app and chain node.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use statuslink::app::{self, Services};
use statuslink::chain::RpcChainProbe;
use statuslink::config::{
    ChainConfig, Config, DeviceConfig, PluginConfig, ReconcileConfig, ReconcilePolicy,
    WebServerConfig,
};
use statuslink::reconcile::Freshness;
use statuslink::remote::StatusClient;
use tempfile::tempdir;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LAN: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

fn config(status: &MockServer, chain: &MockServer, state_dir: &Path) -> Config {
    Config {
        device: DeviceConfig {
            ip: status.address().ip().to_string(),
            port: status.address().port(),
            timeout: Duration::from_millis(200),
        },
        chain: ChainConfig {
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: chain.address().port(),
            proxy: false,
            chain_name: "embark".to_string(),
            network_id: None,
        },
        webserver: WebServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
        },
        plugin: PluginConfig {
            name: "my-dapp".to_string(),
            dapp_url: None,
            state_dir: state_dir.to_path_buf(),
            metadata: Default::default(),
        },
        reconcile: ReconcileConfig {
            interval: Duration::from_millis(300),
            policy: ReconcilePolicy::DiscoveryFirst,
            open_dapp_when_already_connected: true,
            restart_probe_attempts: 3,
            service_check_interval: None,
        },
    }
}

fn services(config: &Config) -> Services {
    Services {
        remote: Arc::new(StatusClient::new(&config.device).unwrap()),
        chain: Arc::new(
            RpcChainProbe::new(&config.chain, config.device.timeout).unwrap(),
        ),
        lan: Arc::new(|| Some(IpAddr::V4(LAN))),
    }
}

async fn chain_node() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "net_version"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "1337"})),
        )
        .mount(&server)
        .await;
    server
}

async fn mount_pong(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Pong!"})))
        .mount(server)
        .await;
}

fn node_url(chain: &MockServer) -> String {
    format!("http://{LAN}:{}", chain.address().port())
}

fn cached_ids(state_dir: &Path) -> Vec<String> {
    let mut ids: Vec<String> = std::fs::read_dir(state_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("networkId_"))
        .map(|entry| std::fs::read_to_string(entry.path()).unwrap())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn first_run_adds_connects_caches_and_opens_dapp() {
    let status = MockServer::start().await;
    let chain = chain_node().await;
    let dir = tempdir().unwrap();
    let state_dir = dir.path().join(".embark").join("embark-status");

    mount_pong(&status).await;
    Mock::given(method("GET"))
        .and(path("/networks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"networks": {}})))
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/network"))
        .and(body_json(json!({
            "name": "Embark (my-dapp)",
            "url": node_url(&chain),
            "chain": "embark",
            "network-id": 1337
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Network has been added.",
            "network-id": "abc123"
        })))
        .expect(1)
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/network/connect"))
        .and(body_json(json!({"id": "abc123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Network has been connected.",
            "network-id": "abc123"
        })))
        .expect(1)
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/dapp/open"))
        .and(body_json(json!({"url": format!("http://{LAN}:8000/")})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "URL has been opened."})),
        )
        .expect(1)
        .mount(&status)
        .await;

    let config = config(&status, &chain, &state_dir);
    let services = services(&config);
    let (_reload_tx, reload_rx) = mpsc::channel(1);

    let connection = app::run(config, services, reload_rx).await.unwrap();

    assert_eq!(connection.network_id.as_str(), "abc123");
    assert_eq!(connection.freshness, Freshness::Fresh);
    assert!(connection.created);
    assert_eq!(cached_ids(&state_dir), vec!["abc123".to_string()]);
}

#[tokio::test]
async fn second_run_finds_active_network_and_adds_nothing() {
    let status = MockServer::start().await;
    let chain = chain_node().await;
    let dir = tempdir().unwrap();

    mount_pong(&status).await;
    Mock::given(method("GET"))
        .and(path("/networks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "networks": {
                "abc123": {
                    "name": "Embark (my-dapp)",
                    "config": {
                        "UpstreamConfig": {"Enabled": true, "URL": node_url(&chain)},
                        "NetworkId": 1337
                    },
                    "active?": true
                }
            }
        })))
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/network"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/network/connect"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/dapp/open"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "URL has been opened."})),
        )
        .expect(1)
        .mount(&status)
        .await;

    let config = config(&status, &chain, dir.path());
    let services = services(&config);
    let (_reload_tx, reload_rx) = mpsc::channel(1);

    let connection = app::run(config, services, reload_rx).await.unwrap();

    assert_eq!(connection.freshness, Freshness::AlreadyConnected);
    assert!(!connection.created);
    assert_eq!(cached_ids(dir.path()), vec!["abc123".to_string()]);
}

#[tokio::test]
async fn unreachable_app_is_retried_until_it_answers() {
    let status = MockServer::start().await;
    let chain = chain_node().await;
    let dir = tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&status)
        .await;
    mount_pong(&status).await;
    Mock::given(method("GET"))
        .and(path("/networks"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Network has been added.",
            "network-id": "xyz789"
        })))
        .expect(1)
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/network/connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Network has been connected.",
            "network-id": "xyz789"
        })))
        .mount(&status)
        .await;
    Mock::given(method("POST"))
        .and(path("/dapp/open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .mount(&status)
        .await;

    let mut config = config(&status, &chain, dir.path());
    config.reconcile.open_dapp_when_already_connected = false;
    let services = services(&config);
    let (_reload_tx, reload_rx) = mpsc::channel(1);

    let connection = app::run(config, services, reload_rx).await.unwrap();

    assert_eq!(connection.network_id.as_str(), "xyz789");
    let pings = status
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/ping")
        .count();
    assert!(pings >= 3, "expected retries, saw {pings} pings");
}
