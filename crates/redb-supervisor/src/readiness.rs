//! System-readiness state machine and ready-callbacks.

use crate::health::HealthMonitor;
use crate::service::ServiceManager;
use chrono::{DateTime, Utc};
use redb_common::Health;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::info;

type ReadyCallback = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ReadinessState {
    pub per_service: std::collections::HashMap<String, Health>,
    pub overall_ready: bool,
    pub last_transition_at: Option<DateTime<Utc>>,
}

/// Polls [`ServiceManager`] + [`HealthMonitor`] on its own background loop.
/// `overall_ready = for all required services: Running and Healthy`. Fires
/// every registered callback, in order, exactly once on the first
/// `false -> true` transition of a run.
pub struct ReadinessManager {
    manager: Arc<ServiceManager>,
    health: Arc<HealthMonitor>,
    state: Mutex<ReadinessState>,
    callbacks: Mutex<Vec<ReadyCallback>>,
    fired: Mutex<bool>,
}

impl ReadinessManager {
    pub fn new(manager: Arc<ServiceManager>, health: Arc<HealthMonitor>) -> Self {
        Self {
            manager,
            health,
            state: Mutex::new(ReadinessState {
                per_service: std::collections::HashMap::new(),
                overall_ready: false,
                last_transition_at: None,
            }),
            callbacks: Mutex::new(Vec::new()),
            fired: Mutex::new(false),
        }
    }

    /// Registers a callback fired on the first readiness transition of this
    /// run. Callbacks must not block the readiness loop — the loop
    /// `tokio::spawn`s each one rather than awaiting it in place.
    pub fn add_system_ready_callback<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks
            .lock()
            .expect("readiness callbacks lock poisoned")
            .push(Box::new(move || Box::pin(callback())));
    }

    pub fn snapshot(&self) -> ReadinessState {
        self.state.lock().expect("readiness state lock poisoned").clone()
    }

    fn compute_overall_ready(&self) -> bool {
        self.manager
            .snapshot()
            .iter()
            .filter(|i| i.spec.required)
            .all(|i| i.is_running() && self.health.is_healthy(&i.spec.name))
    }

    fn tick(&self) {
        let per_service = self.health.snapshot();
        let overall_ready = self.compute_overall_ready();

        let mut state = self.state.lock().expect("readiness state lock poisoned");
        let was_ready = state.overall_ready;
        state.per_service = per_service;
        if overall_ready != was_ready {
            state.last_transition_at = Some(Utc::now());
        }
        state.overall_ready = overall_ready;
        drop(state);

        let mut fired = self.fired.lock().expect("fired flag lock poisoned");
        if overall_ready && !was_ready && !*fired {
            *fired = true;
            info!("system readiness reached, firing ready-callbacks");
            for callback in self.callbacks.lock().expect("readiness callbacks lock poisoned").iter() {
                tokio::spawn(callback());
            }
        }
    }

    /// Background loop; cancellation stops it, callbacks already started are
    /// allowed to complete.
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                _ = shutdown.recv() => {
                    info!("readiness loop shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_store::LogStore;
    use redb_common::config::ServiceConfig;
    use redb_keyring::Keyring;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keyring() -> Arc<Keyring> {
        let dir = tempfile::tempdir().unwrap().into_path();
        let config = redb_common::config::KeyringConfig {
            backend: redb_common::config::KeyringBackend::File,
            path: dir.join("k.redbkey").to_string_lossy().into_owned(),
            master_key: "test".to_string(),
            service_name: "redb".to_string(),
        };
        Arc::new(Keyring::from_config(&config, "g").unwrap())
    }

    #[test]
    fn overall_ready_requires_every_required_service_running_and_healthy() {
        let (tx, _rx) = broadcast::channel(4);
        let log_store = Arc::new(LogStore::new(7));
        let manager = ServiceManager::new(
            &[ServiceConfig::test_default("a")],
            keyring(),
            "g".to_string(),
            log_store,
            tx,
        )
        .unwrap();
        let health = Arc::new(HealthMonitor::new(manager.clone()));
        let readiness = ReadinessManager::new(manager, health);
        assert!(!readiness.compute_overall_ready());
    }

    #[tokio::test]
    async fn callback_fires_at_most_once_per_run() {
        let (tx, _rx) = broadcast::channel(4);
        let log_store = Arc::new(LogStore::new(7));
        let manager = ServiceManager::new(&[], keyring(), "g".to_string(), log_store, tx).unwrap();
        let health = Arc::new(HealthMonitor::new(manager.clone()));
        let readiness = ReadinessManager::new(manager, health);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        readiness.add_system_ready_callback(move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        readiness.tick();
        readiness.tick();
        readiness.tick();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
