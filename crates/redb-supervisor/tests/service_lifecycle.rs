//! End-to-end exercises of `ServiceManager` against real child processes.
//!
//! The managed "services" are tiny bash fixtures standing in for actual
//! reDB service binaries: one that records its start (and, on SIGTERM,
//! its stop) to a shared log file and then sleeps, and one that exits
//! immediately with a failure code to model a service that can't start.

use redb_common::Health;
use redb_common::config::{KeyringBackend, KeyringConfig, ServiceConfig};
use redb_keyring::Keyring;
use redb_supervisor::service::{ServiceManager, ServiceState};
use redb_supervisor::log_store::LogStore;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// A long-lived fixture: appends `$REDB_SERVICE_NAME` to `$START_LOG` on
/// launch, then waits on a backgrounded `sleep`, appending the same name to
/// `$STOP_LOG` (if set) when it catches `SIGTERM`, mirroring how a managed
/// reDB service is expected to shut down on the supervisor's signal.
const LONG_LIVED_SERVICE: &str = r#"#!/usr/bin/env bash
set -u
echo "$REDB_SERVICE_NAME" >> "$START_LOG"
sleep 30 &
child=$!
if [ -n "${STOP_LOG:-}" ]; then
    trap 'echo "$REDB_SERVICE_NAME" >> "$STOP_LOG"; kill "$child" 2>/dev/null; exit 0' TERM
fi
wait "$child"
"#;

const FAILS_IMMEDIATELY: &str = r#"#!/usr/bin/env bash
exit 1
"#;

/// Ignores `SIGTERM` outright, to exercise the force-kill path of
/// `stop_all_services` once a service blows through its grace deadline.
const IGNORES_SIGTERM: &str = r#"#!/usr/bin/env bash
trap '' TERM
sleep 30 &
wait $!
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn test_keyring(dir: &Path) -> Arc<Keyring> {
    let config = KeyringConfig {
        backend: KeyringBackend::File,
        path: dir.join("keyring.redbkey").to_string_lossy().into_owned(),
        master_key: "test-master-key".to_string(),
        service_name: "redb-test".to_string(),
    };
    Arc::new(Keyring::from_config(&config, "test-group").unwrap())
}

fn manager_for(services: Vec<ServiceConfig>, dir: &Path) -> Arc<ServiceManager> {
    let (shutdown_tx, _rx) = broadcast::channel(8);
    let log_store = Arc::new(LogStore::new(7));
    ServiceManager::new(&services, test_keyring(dir), "test-group".to_string(), log_store, shutdown_tx).unwrap()
}

/// Drives every configured service through `Register` then a `Healthy`
/// heartbeat on a short interval, standing in for the RPC calls a real
/// managed service sends once it finishes its own startup.
fn spawn_heartbeat_loop(manager: Arc<ServiceManager>, names: Vec<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            for name in &names {
                manager.register(name, 0, "127.0.0.1:0");
                manager.heartbeat(name, Health::Healthy);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dependency_chain_starts_in_declared_order() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "service.sh", LONG_LIVED_SERVICE);
    let start_log = dir.path().join("start.log");

    let mut env = std::collections::BTreeMap::new();
    env.insert("START_LOG".to_string(), start_log.to_string_lossy().into_owned());

    let services = vec![
        ServiceConfig { binary_path: script.to_string_lossy().into_owned(), env: env.clone(), depends_on: vec![], ..ServiceConfig::test_default("core") },
        ServiceConfig { binary_path: script.to_string_lossy().into_owned(), env: env.clone(), depends_on: vec!["core".to_string()], ..ServiceConfig::test_default("mesh") },
        ServiceConfig { binary_path: script.to_string_lossy().into_owned(), env, depends_on: vec!["mesh".to_string()], ..ServiceConfig::test_default("anchor") },
    ];

    let manager = manager_for(services, dir.path());
    let heartbeats = spawn_heartbeat_loop(manager.clone(), manager.startup_order().to_vec());

    manager.start_all().await.unwrap();
    heartbeats.abort();

    for name in ["core", "mesh", "anchor"] {
        assert_eq!(manager.get(name).unwrap().state, ServiceState::Running, "{name} should be running");
    }

    let started = read_lines(&start_log);
    let pos = |n: &str| started.iter().position(|l| l == n).unwrap();
    assert!(pos("core") < pos("mesh"), "core must start before mesh");
    assert!(pos("mesh") < pos("anchor"), "mesh must start before anchor");

    manager.stop_all_services(Duration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn required_service_start_failure_aborts_before_dependents_start() {
    let dir = tempfile::tempdir().unwrap();
    let start_log = dir.path().join("start.log");
    let long_lived = write_script(dir.path(), "service.sh", LONG_LIVED_SERVICE);

    let mut env = std::collections::BTreeMap::new();
    env.insert("START_LOG".to_string(), start_log.to_string_lossy().into_owned());

    let services = vec![
        ServiceConfig {
            binary_path: dir.path().join("does-not-exist").to_string_lossy().into_owned(),
            depends_on: vec![],
            required: true,
            ..ServiceConfig::test_default("core")
        },
        ServiceConfig {
            binary_path: long_lived.to_string_lossy().into_owned(),
            env,
            depends_on: vec!["core".to_string()],
            ..ServiceConfig::test_default("mesh")
        },
    ];

    let manager = manager_for(services, dir.path());
    let result = manager.start_all().await;

    assert!(result.is_err(), "a required service that fails to spawn must abort start_all");
    assert_eq!(manager.get("mesh").unwrap().state, ServiceState::Pending, "mesh must never have been started");
    assert!(read_lines(&start_log).is_empty(), "mesh's fixture must never have run");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn optional_service_failure_does_not_abort_startup() {
    let dir = tempfile::tempdir().unwrap();
    let start_log = dir.path().join("start.log");
    let long_lived = write_script(dir.path(), "service.sh", LONG_LIVED_SERVICE);
    let fails = write_script(dir.path(), "fails.sh", FAILS_IMMEDIATELY);

    let mut env = std::collections::BTreeMap::new();
    env.insert("START_LOG".to_string(), start_log.to_string_lossy().into_owned());

    let services = vec![
        ServiceConfig {
            binary_path: fails.to_string_lossy().into_owned(),
            depends_on: vec![],
            required: false,
            ..ServiceConfig::test_default("sidecar")
        },
        ServiceConfig {
            binary_path: long_lived.to_string_lossy().into_owned(),
            env,
            depends_on: vec![],
            ..ServiceConfig::test_default("core")
        },
    ];

    let manager = manager_for(services, dir.path());
    let heartbeats = spawn_heartbeat_loop(manager.clone(), vec!["core".to_string()]);
    manager.start_all().await.unwrap();
    heartbeats.abort();

    assert_eq!(manager.get("core").unwrap().state, ServiceState::Running);
    manager.stop_all_services(Duration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_signals_services_in_reverse_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "service.sh", LONG_LIVED_SERVICE);
    let start_log = dir.path().join("start.log");
    let stop_log = dir.path().join("stop.log");

    let mut env = std::collections::BTreeMap::new();
    env.insert("START_LOG".to_string(), start_log.to_string_lossy().into_owned());
    env.insert("STOP_LOG".to_string(), stop_log.to_string_lossy().into_owned());

    let services = vec![
        ServiceConfig { binary_path: script.to_string_lossy().into_owned(), env: env.clone(), depends_on: vec![], ..ServiceConfig::test_default("core") },
        ServiceConfig { binary_path: script.to_string_lossy().into_owned(), env: env.clone(), depends_on: vec!["core".to_string()], ..ServiceConfig::test_default("mesh") },
        ServiceConfig { binary_path: script.to_string_lossy().into_owned(), env, depends_on: vec!["mesh".to_string()], ..ServiceConfig::test_default("anchor") },
    ];

    let manager = manager_for(services, dir.path());
    let heartbeats = spawn_heartbeat_loop(manager.clone(), manager.startup_order().to_vec());
    manager.start_all().await.unwrap();
    heartbeats.abort();

    let errors = manager.stop_all_services(Duration::from_secs(10)).await;
    assert!(errors.is_empty(), "stop_all_services reported errors: {errors:?}");

    for name in ["core", "mesh", "anchor"] {
        assert_eq!(manager.get(name).unwrap().state, ServiceState::Stopped, "{name} should have stopped cleanly");
    }

    let stopped = read_lines(&stop_log);
    assert_eq!(stopped, vec!["anchor", "mesh", "core"], "SIGTERM must reach dependents before their dependencies");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_all_force_terminates_a_service_that_ignores_its_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "ignores.sh", IGNORES_SIGTERM);

    let services = vec![ServiceConfig {
        binary_path: script.to_string_lossy().into_owned(),
        ..ServiceConfig::test_default("stubborn")
    }];

    let manager = manager_for(services, dir.path());
    let heartbeats = spawn_heartbeat_loop(manager.clone(), vec!["stubborn".to_string()]);
    manager.start_all().await.unwrap();
    heartbeats.abort();

    let started = std::time::Instant::now();
    manager.stop_all_services(Duration::from_millis(300)).await;
    assert!(started.elapsed() < Duration::from_secs(5), "force-kill must not wait out the full sleep");
    assert_eq!(manager.get("stubborn").unwrap().state, ServiceState::Stopped);
}
