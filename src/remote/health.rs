//! Status app liveness for operator surfaces.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RemoteControl;

/// Whether the Status app answered the last ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    On,
    Off,
}

impl ServiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// One service-check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub status: ServiceState,
}

/// Service name shown for the phone at `device_ip`.
pub fn service_name(device_ip: &str) -> String {
    format!("Status.im ({device_ip})")
}

/// Ping the app once and report it as a named service.
pub async fn service_check(remote: &dyn RemoteControl, device_ip: &str) -> ServiceStatus {
    let status = if remote.ping().await {
        ServiceState::On
    } else {
        ServiceState::Off
    };
    ServiceStatus {
        name: service_name(device_ip),
        status,
    }
}

/// A change in liveness between two checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BackOnline,
    WentOffline,
}

/// Tracks the last observed state and reports transitions. The first
/// observation counts as a transition so startup state is always logged.
#[derive(Debug, Default)]
pub struct LivenessMonitor {
    last: Option<ServiceState>,
}

impl LivenessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, state: ServiceState) -> Option<Transition> {
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(match state {
            ServiceState::On => Transition::BackOnline,
            ServiceState::Off => Transition::WentOffline,
        })
    }
}

/// Poll the app forever, logging each liveness transition.
pub async fn run_service_checks(remote: Arc<dyn RemoteControl>, device_ip: String, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut monitor = LivenessMonitor::new();

    loop {
        ticker.tick().await;
        let status = service_check(remote.as_ref(), &device_ip).await;
        tracing::debug!("{} is {}", status.name, status.status.as_str());
        match monitor.observe(status.status) {
            Some(Transition::BackOnline) => {
                tracing::info!("Connected to Status.im mobile app!");
            }
            Some(Transition::WentOffline) => {
                tracing::warn!(
                    "Couldn't connect or lost connection to Status.im mobile app at {}...",
                    device_ip
                );
            }
            None => {}
        }
    }
}
