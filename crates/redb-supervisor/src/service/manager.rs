use super::{ServiceInstance, ServiceState};
use crate::error::{Error, Result};
use crate::log_store::{LogEntry, LogStore};
use chrono::Utc;
use redb_common::Health;
use redb_common::config::ServiceConfig;
use redb_keyring::Keyring;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as TokioMutex, broadcast};
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Owns the per-service state machine: spawn, register, health, stop.
///
/// Always used behind an `Arc`: methods that spawn watcher tasks take
/// `self: &Arc<Self>` so those tasks can call back into the manager when the
/// child exits.
pub struct ServiceManager {
    instances: StdRwLock<HashMap<String, ServiceInstance>>,
    children: TokioMutex<HashMap<String, Arc<TokioMutex<Child>>>>,
    startup_order: Vec<String>,
    keyring: Arc<Keyring>,
    group_id: String,
    log_store: Arc<LogStore>,
    shutdown: broadcast::Sender<()>,
}

impl ServiceManager {
    pub fn new(
        services: &[ServiceConfig],
        keyring: Arc<Keyring>,
        group_id: String,
        log_store: Arc<LogStore>,
        shutdown: broadcast::Sender<()>,
    ) -> Result<Arc<Self>> {
        let enabled: Vec<ServiceConfig> = services.iter().filter(|s| s.enabled).cloned().collect();
        let startup_order = redb_common::topo::startup_order(&enabled).map_err(Error::Config)?;

        let mut instances = HashMap::new();
        for spec in enabled {
            instances.insert(spec.name.clone(), ServiceInstance::new(spec));
        }

        Ok(Arc::new(Self {
            instances: StdRwLock::new(instances),
            children: TokioMutex::new(HashMap::new()),
            startup_order,
            keyring,
            group_id,
            log_store,
            shutdown,
        }))
    }

    pub fn startup_order(&self) -> &[String] {
        &self.startup_order
    }

    pub fn snapshot(&self) -> Vec<ServiceInstance> {
        self.instances
            .read()
            .expect("service instance lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<ServiceInstance> {
        self.instances
            .read()
            .expect("service instance lock poisoned")
            .get(name)
            .cloned()
    }

    fn with_instance_mut<F: FnOnce(&mut ServiceInstance)>(&self, name: &str, f: F) {
        if let Some(instance) = self
            .instances
            .write()
            .expect("service instance lock poisoned")
            .get_mut(name)
        {
            f(instance);
        }
    }

    /// Spawns the binary with its derived environment and transitions
    /// `Pending -> Starting`. Returns once the process is spawned, not once
    /// it is healthy — use [`Self::wait_healthy`] for that.
    pub async fn start_service(self: &Arc<Self>, name: &str) -> Result<()> {
        let spec = self.get(name).map(|i| i.spec).ok_or_else(|| Error::ServiceStart {
            name: name.to_string(),
            reason: "not configured".to_string(),
        })?;

        let namespace = format!("service-{}-{}", self.group_id, name);
        let mut command = Command::new(&spec.binary_path);
        command
            .args(&spec.args)
            .env("REDB_SERVICE_NAME", name)
            .env("REDB_SERVICE_PORT", spec.port.to_string())
            .env("REDB_KEYRING_NAMESPACE", &namespace)
            .env("REDB_SUPERVISOR_GROUP_ID", &self.group_id)
            .envs(&spec.env)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::ServiceStart {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            self.spawn_log_forwarder(name, "info", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_log_forwarder(name, "error", stderr);
        }

        self.with_instance_mut(name, |i| {
            i.pid = pid;
            i.state = ServiceState::Starting;
        });

        let child = Arc::new(TokioMutex::new(child));
        self.children.lock().await.insert(name.to_string(), child.clone());

        let manager = self.clone();
        let service_name = name.to_string();
        let shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            manager.watch(service_name, child, shutdown_rx).await;
        });

        Ok(())
    }

    fn spawn_log_forwarder<R>(&self, name: &str, default_level: &str, reader: R)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let log_store = self.log_store.clone();
        let name = name.to_string();
        let default_level = default_level.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log_store.append(LogEntry {
                    timestamp: Utc::now(),
                    service_name: name.clone(),
                    level: default_level.clone(),
                    message: line,
                    fields: HashMap::new(),
                });
            }
        });
    }

    /// Races the child's exit against this service's stop signal and the
    /// process-wide shutdown broadcast. An unexpected exit while `Running`
    /// transitions the instance to `Failed`.
    async fn watch(
        self: Arc<Self>,
        name: String,
        child: Arc<TokioMutex<Child>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let exit_status = {
            let mut guard = child.lock().await;
            tokio::select! {
                status = guard.wait() => Some(status),
                _ = shutdown.recv() => None,
            }
        };

        match exit_status {
            Some(Ok(status)) => {
                let was_stopping = self.get(&name).map(|i| i.state) == Some(ServiceState::Stopping);
                if was_stopping || status.success() {
                    info!(service = %name, "service exited");
                    self.with_instance_mut(&name, |i| {
                        i.state = ServiceState::Stopped;
                        i.pid = None;
                    });
                } else {
                    warn!(service = %name, code = ?status.code(), "service exited unexpectedly");
                    self.with_instance_mut(&name, |i| {
                        i.state = ServiceState::Failed;
                        i.pid = None;
                        i.health = Health::Unhealthy;
                        i.last_error = Some(format!("process exited with {status}"));
                    });
                }
            }
            Some(Err(e)) => {
                error!(service = %name, error = %e, "failed to wait on child process");
                self.with_instance_mut(&name, |i| {
                    i.state = ServiceState::Failed;
                    i.last_error = Some(e.to_string());
                });
            }
            None => {
                // Shutdown fired while still running; StopAllServices owns
                // the graceful/forced termination from here.
            }
        }
        self.children.lock().await.remove(&name);
    }

    /// Polls the service's heartbeat-derived health at 1 s cadence.
    /// Returns once it reports `Healthy`, or a timeout error.
    pub async fn wait_healthy(&self, name: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(instance) = self.get(name) {
                if instance.health == Health::Healthy && instance.state == ServiceState::Running {
                    return Ok(());
                }
                if instance.state == ServiceState::Failed {
                    return Err(Error::HealthTimeout { name: name.to_string() });
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::HealthTimeout { name: name.to_string() });
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Starts every enabled service in dependency order, gating each on a
    /// 30 s health budget before moving to the next. Aborts on a `required`
    /// service failing to start or come healthy; logs and continues for
    /// optional ones.
    pub async fn start_all(self: &Arc<Self>) -> Result<()> {
        let order = self.startup_order.clone();
        for name in &order {
            let required = self.get(name).map(|i| i.spec.required).unwrap_or(false);

            if let Err(e) = self.start_service(name).await {
                if required {
                    return Err(e);
                }
                warn!(service = %name, error = %e, "optional service failed to start, continuing");
                continue;
            }

            if let Err(e) = self.wait_healthy(name, Duration::from_secs(30)).await {
                if required {
                    // A required service that never becomes healthy is not a
                    // hard startup abort per spec §4.3 — only a failed
                    // *start* aborts. It is recorded as degraded and startup
                    // continues so dependents may still self-degrade.
                    warn!(service = %name, "required service failed health gate: {e}");
                } else {
                    warn!(service = %name, "optional service failed health gate: {e}");
                }
            } else {
                self.with_instance_mut(name, |i| i.state = ServiceState::Running);
            }
        }
        Ok(())
    }

    /// Announces a starting service (called by the RPC layer).
    pub fn register(&self, name: &str, pid: u32, _endpoint: &str) {
        self.with_instance_mut(name, |i| {
            i.pid = Some(pid);
            i.registered_at = Some(Utc::now());
            if i.state == ServiceState::Starting {
                i.state = ServiceState::Running;
            }
        });
    }

    /// Announces a clean stop (called by the RPC layer).
    pub fn unregister(&self, name: &str) {
        self.with_instance_mut(name, |i| {
            i.state = ServiceState::Stopped;
            i.pid = None;
        });
    }

    /// Records an explicit heartbeat health report.
    pub fn heartbeat(&self, name: &str, health: Health) {
        self.with_instance_mut(name, |i| {
            i.last_heartbeat_at = Some(Utc::now());
            i.health = health;
        });
    }

    /// Folds in a health reading computed by [`crate::health::HealthMonitor`]
    /// without clobbering a worse reading already on record this tick.
    pub fn update_effective_health(&self, name: &str, health: Health) {
        self.with_instance_mut(name, |i| i.health = health);
    }

    /// Signals every running service in reverse dependency order and waits
    /// for `Stopped` within `deadline`. Services that do not exit in time
    /// are force-terminated.
    pub async fn stop_all_services(&self, deadline: Duration) -> Vec<Error> {
        let mut errors = Vec::new();
        let mut reverse_order = self.startup_order.clone();
        reverse_order.reverse();

        for name in reverse_order {
            if self.get(&name).map(|i| i.is_running()).unwrap_or(false) {
                self.with_instance_mut(&name, |i| i.state = ServiceState::Stopping);
                if let Err(e) = self.signal_stop(&name).await {
                    errors.push(e);
                    continue;
                }
                if let Err(e) = self.await_stopped(&name, deadline).await {
                    errors.push(e);
                }
            }
        }
        errors
    }

    async fn signal_stop(&self, name: &str) -> Result<()> {
        let children = self.children.lock().await;
        let Some(child) = children.get(name) else {
            return Ok(());
        };
        #[cfg(unix)]
        {
            let guard = child.lock().await;
            if let Some(pid) = guard.id() {
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let mut guard = child.lock().await;
            let _ = guard.start_kill();
        }
        Ok(())
    }

    async fn await_stopped(&self, name: &str, deadline: Duration) -> Result<()> {
        let waited = tokio::time::timeout(deadline, async {
            loop {
                match self.get(name).map(|i| i.state) {
                    Some(ServiceState::Stopped) | Some(ServiceState::Failed) | None => return,
                    _ => tokio::time::sleep(Duration::from_millis(200)).await,
                }
            }
        })
        .await;

        if waited.is_err() {
            warn!(service = %name, "service did not stop in time, force-terminating");
            let children = self.children.lock().await;
            if let Some(child) = children.get(name) {
                let mut guard = child.lock().await;
                let _ = guard.start_kill();
            }
            self.with_instance_mut(name, |i| {
                i.state = ServiceState::Stopped;
                i.pid = None;
                i.last_error = Some("force-terminated after stop timeout".to_string());
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb_common::config::KeyringConfig;

    fn keyring() -> Arc<Keyring> {
        let dir = tempfile::tempdir().unwrap().into_path();
        let config = KeyringConfig {
            backend: redb_common::config::KeyringBackend::File,
            path: dir.join("k.redbkey").to_string_lossy().into_owned(),
            master_key: "test".to_string(),
            service_name: "redb".to_string(),
        };
        Arc::new(Keyring::from_config(&config, "g").unwrap())
    }

    fn manager_with(services: Vec<ServiceConfig>) -> Arc<ServiceManager> {
        let (tx, _rx) = broadcast::channel(4);
        let log_store = Arc::new(LogStore::new(7));
        ServiceManager::new(&services, keyring(), "g".to_string(), log_store, tx).unwrap()
    }

    #[test]
    fn new_instances_start_pending() {
        let manager = manager_with(vec![ServiceConfig::test_default("a")]);
        let instance = manager.get("a").unwrap();
        assert_eq!(instance.state, ServiceState::Pending);
        assert!(instance.pid.is_none());
    }

    #[test]
    fn register_transitions_starting_to_running() {
        let manager = manager_with(vec![ServiceConfig::test_default("a")]);
        manager.with_instance_mut("a", |i| i.state = ServiceState::Starting);
        manager.register("a", 1234, "127.0.0.1:0");
        let instance = manager.get("a").unwrap();
        assert_eq!(instance.state, ServiceState::Running);
        assert_eq!(instance.pid, Some(1234));
    }

    #[test]
    fn unregister_clears_pid_and_marks_stopped() {
        let manager = manager_with(vec![ServiceConfig::test_default("a")]);
        manager.register("a", 1234, "");
        manager.unregister("a");
        let instance = manager.get("a").unwrap();
        assert_eq!(instance.state, ServiceState::Stopped);
        assert!(instance.pid.is_none());
    }

    #[tokio::test]
    async fn wait_healthy_times_out_when_never_healthy() {
        let manager = manager_with(vec![ServiceConfig::test_default("a")]);
        let result = manager.wait_healthy("a", Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wait_healthy_returns_as_soon_as_healthy() {
        let manager = manager_with(vec![ServiceConfig::test_default("a")]);
        manager.with_instance_mut("a", |i| i.state = ServiceState::Running);
        manager.heartbeat("a", Health::Healthy);
        manager.wait_healthy("a", Duration::from_secs(2)).await.unwrap();
    }
}
