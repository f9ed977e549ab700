//! Aggregates health signals fed from three sources — explicit RPC
//! heartbeats, periodic active probes, and process liveness — and exposes
//! them combined by "worst wins".

use crate::service::{ServiceManager, ServiceState};
use redb_common::Health;
use redb_common::config::ServiceConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Active probes give up quickly; a slow or hung health endpoint should not
/// hold up the whole tick.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HealthMonitor {
    manager: Arc<ServiceManager>,
    http: reqwest::Client,
}

impl HealthMonitor {
    pub fn new(manager: Arc<ServiceManager>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("failed to build health-probe HTTP client");
        Self { manager, http }
    }

    /// Worst-wins combination of a service's explicit (heartbeat-reported)
    /// health with its process-liveness signal.
    fn effective_health(state: ServiceState, pid_alive: bool, reported: Health) -> Health {
        let liveness = match (state, pid_alive) {
            (ServiceState::Running, true) => Health::Healthy,
            (ServiceState::Starting, _) => Health::Unknown,
            (ServiceState::Stopping, _) => Health::Unknown,
            _ => Health::Unhealthy,
        };
        reported.combine(liveness)
    }

    /// Actively hits a service's configured health endpoint. Returns `None`
    /// when the service has none configured, meaning this source is left out
    /// of the combine entirely rather than folded in as `Unknown`.
    async fn probe(&self, spec: &ServiceConfig) -> Option<Health> {
        if spec.health_endpoint.trim().is_empty() {
            return None;
        }
        let url = if spec.health_endpoint.contains("://") {
            spec.health_endpoint.clone()
        } else {
            format!(
                "http://127.0.0.1:{}/{}",
                spec.port,
                spec.health_endpoint.trim_start_matches('/')
            )
        };

        Some(match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Health::Healthy,
            Ok(resp) => {
                warn!(service = %spec.name, status = %resp.status(), "active health probe returned a non-success status");
                Health::Degraded
            }
            Err(e) => {
                warn!(service = %spec.name, error = %e, "active health probe failed");
                Health::Unhealthy
            }
        })
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        self.manager
            .snapshot()
            .into_iter()
            .find(|i| i.spec.name == name)
            .map(|i| Self::effective_health(i.state, i.pid.is_some(), i.health) == Health::Healthy)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> HashMap<String, Health> {
        self.manager
            .snapshot()
            .into_iter()
            .map(|i| {
                let effective = Self::effective_health(i.state, i.pid.is_some(), i.health);
                (i.spec.name, effective)
            })
            .collect()
    }

    /// Combines heartbeat and liveness synchronously, then folds in an
    /// active probe of each service's `health_endpoint` (when configured)
    /// before writing the result back as the new effective health.
    async fn tick(&self) {
        let instances = self.manager.snapshot();
        let probes = futures::future::join_all(instances.iter().map(|i| self.probe(&i.spec))).await;

        for (instance, probed) in instances.iter().zip(probes) {
            let mut health = Self::effective_health(instance.state, instance.pid.is_some(), instance.health);
            if let Some(probed) = probed {
                health = health.combine(probed);
            }
            self.manager.update_effective_health(&instance.spec.name, health);
        }
    }

    /// Background loop at a fixed interval; exits within one interval of
    /// `shutdown` firing.
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.recv() => {
                    debug!("health monitor loop shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_and_alive_with_no_complaints_is_healthy() {
        let h = HealthMonitor::effective_health(ServiceState::Running, true, Health::Healthy);
        assert_eq!(h, Health::Healthy);
    }

    #[test]
    fn dead_process_overrides_a_healthy_heartbeat() {
        let h = HealthMonitor::effective_health(ServiceState::Failed, false, Health::Healthy);
        assert_eq!(h, Health::Unhealthy);
    }

    #[test]
    fn degraded_heartbeat_survives_worst_wins_even_if_alive() {
        let h = HealthMonitor::effective_health(ServiceState::Running, true, Health::Degraded);
        assert_eq!(h, Health::Degraded);
    }

    #[tokio::test]
    async fn probe_is_skipped_when_no_health_endpoint_is_configured() {
        let monitor = HealthMonitor {
            manager: {
                let (tx, _rx) = broadcast::channel(1);
                ServiceManager::new(&[], test_keyring(), "g".to_string(), Arc::new(crate::log_store::LogStore::new(1)), tx).unwrap()
            },
            http: reqwest::Client::new(),
        };
        let spec = redb_common::config::ServiceConfig::test_default("a");
        assert!(monitor.probe(&spec).await.is_none());
    }

    fn test_keyring() -> Arc<redb_keyring::Keyring> {
        let dir = tempfile::tempdir().unwrap().into_path();
        let config = redb_common::config::KeyringConfig {
            backend: redb_common::config::KeyringBackend::File,
            path: dir.join("k.redbkey").to_string_lossy().into_owned(),
            master_key: "test".to_string(),
            service_name: "redb".to_string(),
        };
        Arc::new(redb_keyring::Keyring::from_config(&config, "g").unwrap())
    }
}
