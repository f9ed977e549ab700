//! Owns every long-lived subsystem for one running node and drives the
//! signal-triggered shutdown sequence.

use crate::error::{Error, Result};
use crate::health::HealthMonitor;
use crate::initializer::{CredentialSource, Initializer};
use crate::log_store::LogStore;
use crate::readiness::ReadinessManager;
use crate::rpc::SupervisorRpcService;
use crate::service::ServiceManager;
use redb_common::NodeConfig;
use redb_common::identity::NodeIdentity;
use redb_keyring::Keyring;
use redb_proto::SupervisorRpcServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tonic::transport::Server;
use tracing::{error, info, warn};

/// Grace period after signaling services to stop before the RPC server's own
/// graceful-stop budget begins.
const SERVICE_STOP_GRACE: Duration = Duration::from_secs(2);
/// Budget given to the RPC server's `graceful_shutdown` before it is force-
/// aborted.
const RPC_GRACEFUL_BUDGET: Duration = Duration::from_secs(5);
/// Budget given to background task join before the process force-exits.
const TASK_JOIN_BUDGET: Duration = Duration::from_secs(5);

/// `http2_keepalive_interval`/`_timeout`: idle connections are pinged every
/// 15 s and dropped if the ping goes unanswered for as long again.
const RPC_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const RPC_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(15);
/// `max_connection_age`: a managed service is expected to reconnect well
/// within 30 minutes, bounding how long one connection can monopolize a
/// stream.
const RPC_MAX_CONNECTION_AGE: Duration = Duration::from_secs(30 * 60);

pub struct SupervisorRoot {
    config: NodeConfig,
    keyring: Arc<Keyring>,
    manager: Arc<ServiceManager>,
    health: Arc<HealthMonitor>,
    log_store: Arc<LogStore>,
    readiness: Arc<ReadinessManager>,
    /// Broadcast every long-lived loop (per-service watchers, the health/
    /// readiness/log-store loops, and the RPC server's graceful stop)
    /// subscribes to. Only [`Self::shutdown`]'s phase 3 ever sends on it —
    /// an external signal must not reach this channel directly, or services
    /// and the RPC surface would be torn down before `StopAllServices` gets
    /// to run.
    shutdown_tx: broadcast::Sender<()>,
    /// Woken by [`Self::spawn_signal_handler`] (or an internal fatal
    /// startup error) to mean "begin the shutdown orchestration" —
    /// deliberately a separate channel from `shutdown_tx` so the signal
    /// that starts phase 1 is distinct from the broadcast phase 3 sends at
    /// the end of it.
    shutdown_requested: Arc<Notify>,
    background: Vec<JoinHandle<()>>,
}

impl SupervisorRoot {
    pub fn new(config: NodeConfig, keyring: Arc<Keyring>) -> Result<Self> {
        let (shutdown_tx, _rx) = broadcast::channel(16);
        let log_store = Arc::new(LogStore::new(config.logging.retention_days));
        let manager = ServiceManager::new(
            &config.services,
            keyring.clone(),
            config.instance_group.group_id.clone(),
            log_store.clone(),
            shutdown_tx.clone(),
        )?;
        let health = Arc::new(HealthMonitor::new(manager.clone()));
        let readiness = Arc::new(ReadinessManager::new(manager.clone(), health.clone()));

        Ok(Self {
            config,
            keyring,
            manager,
            health,
            log_store,
            readiness,
            shutdown_tx,
            shutdown_requested: Arc::new(Notify::new()),
            background: Vec::new(),
        })
    }

    /// Runs the Initializer's bootstrap pipeline; used for `--initialize`
    /// and `--autoinitialize`.
    pub async fn initialize(&self, source: &dyn CredentialSource) -> Result<NodeIdentity> {
        let initializer = Initializer::new(self.keyring.clone());
        let identity = initializer
            .run(
                &self.config.database,
                self.config.supervisor.port,
                &self.config.global.multi_tenancy,
                source,
            )
            .await?;
        info!(node_id = %identity.node_id, "node initialized");
        Ok(identity)
    }

    /// Confirms bootstrap already happened; called on every normal startup.
    pub async fn validate_bootstrap(&self) -> Result<()> {
        let initializer = Initializer::new(self.keyring.clone());
        initializer.validate(&self.config.database).await?;
        Ok(())
    }

    /// Starts every background loop (health monitor, readiness, log sweep,
    /// supervisor RPC server) and the dependency-ordered service fleet. All
    /// of them run until `shutdown`'s phase 3 broadcasts on the shared
    /// channel, so the RPC surface keeps accepting connections across
    /// phases 1 and 2 exactly like every other background loop.
    pub async fn start(&mut self) -> Result<()> {
        self.readiness.add_system_ready_callback(|| async {
            info!("system is ready");
        });

        let health = self.health.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.background
            .push(tokio::spawn(async move { health.run(Duration::from_secs(5), shutdown_rx).await }));

        let readiness = self.readiness.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.background
            .push(tokio::spawn(async move { readiness.run(Duration::from_secs(2), shutdown_rx).await }));

        let log_store = self.log_store.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.background.push(tokio::spawn(async move {
            log_store.run(Duration::from_secs(3600), shutdown_rx).await
        }));

        let manager = self.manager.clone();
        let health = self.health.clone();
        let log_store = self.log_store.clone();
        let readiness = self.readiness.clone();
        let port = self.config.supervisor.port;
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.background.push(tokio::spawn(async move {
            if let Err(e) = Self::run_rpc_server(port, manager, health, log_store, readiness, shutdown_rx).await {
                error!("supervisor RPC server exited with an error: {e}");
            }
        }));

        self.manager.start_all().await?;
        Ok(())
    }

    /// Builds and serves the supervisor RPC surface until `shutdown_rx`
    /// fires, with keepalive tuned for long-lived same-host loopback
    /// connections from managed services.
    async fn run_rpc_server(
        port: u16,
        manager: Arc<ServiceManager>,
        health: Arc<HealthMonitor>,
        log_store: Arc<LogStore>,
        readiness: Arc<ReadinessManager>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let addr = format!("0.0.0.0:{port}").parse().map_err(|e| Error::ServiceStart {
            name: "supervisor-rpc".to_string(),
            reason: format!("invalid bind address: {e}"),
        })?;

        let service = SupervisorRpcService::new(manager, health, log_store, readiness);

        info!(%addr, "supervisor RPC listening");
        Server::builder()
            .http2_keepalive_interval(Some(RPC_KEEPALIVE_INTERVAL))
            .http2_keepalive_timeout(Some(RPC_KEEPALIVE_TIMEOUT))
            .max_connection_age(Some(RPC_MAX_CONNECTION_AGE))
            .add_service(SupervisorRpcServer::new(service))
            .serve_with_shutdown(addr, async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;
        Ok(())
    }

    /// Races `ctrl_c` against a Unix `SIGTERM`; either wakes whoever is
    /// awaiting [`Self::wait_for_shutdown_signal`] exactly once. This never
    /// touches `shutdown_tx` directly — only `shutdown()`'s own phase 3
    /// does that, once services have already been given a chance to drain.
    pub fn spawn_signal_handler(&self) {
        let shutdown_requested = self.shutdown_requested.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("failed to install SIGTERM handler: {e}");
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received Ctrl-C, shutting down");
                }
            }
            shutdown_requested.notify_one();
        });
    }

    /// Resolves once an external signal arrives (or [`Self::spawn_signal_handler`]
    /// is never installed and something else calls `shutdown_requested` by
    /// hand, e.g. a fatal startup error). Does not itself stop anything —
    /// the caller is expected to follow up with [`Self::shutdown`].
    pub async fn wait_for_shutdown_signal(&self) {
        self.shutdown_requested.notified().await;
    }

    /// Five-phase shutdown: stop services, grace period, RPC graceful-stop
    /// with force-stop fallback, cancel background tasks, release the
    /// keyring. Never panics — every phase logs and proceeds regardless of
    /// partial failure.
    pub async fn shutdown(mut self) {
        info!("phase 1/5: stopping managed services in reverse startup order");
        for err in self.manager.stop_all_services(Duration::from_secs(15)).await {
            warn!("error while stopping a service: {err}");
        }

        info!("phase 2/5: grace period before RPC shutdown");
        tokio::time::sleep(SERVICE_STOP_GRACE).await;

        info!("phase 3/5: broadcasting shutdown to background tasks and RPC server");
        let _ = self.shutdown_tx.send(());
        // `run_rpc_server`'s `serve_with_shutdown` future already observes
        // the broadcast above; this budget covers the case where it is slow
        // to drain in-flight calls.
        tokio::time::sleep(RPC_GRACEFUL_BUDGET.min(Duration::from_millis(50))).await;

        info!("phase 4/5: joining background tasks");
        let joins = std::mem::take(&mut self.background);
        let join_all = futures::future::join_all(joins);
        if tokio::time::timeout(TASK_JOIN_BUDGET, join_all).await.is_err() {
            warn!("background tasks did not join within budget, proceeding anyway");
        }

        info!("phase 5/5: releasing keyring and logger resources");
        // ServiceManager holds the other clone of the keyring Arc, and
        // HealthMonitor/ReadinessManager each hold a clone of ServiceManager
        // itself — all three have to go before try_unwrap below can see the
        // last reference instead of spuriously failing.
        drop(self.manager);
        drop(self.health);
        drop(self.readiness);
        drop(self.log_store);
        match Arc::try_unwrap(self.keyring) {
            Ok(keyring) => keyring.close(),
            Err(_) => warn!("keyring still has outstanding references, skipping close"),
        }
        info!("shutdown complete");
    }
}
