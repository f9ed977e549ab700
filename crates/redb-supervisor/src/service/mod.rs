//! Per-service state machine and the manager that drives it.

mod manager;

pub use manager::ServiceManager;

use chrono::{DateTime, Utc};
use redb_common::Health;
use redb_common::config::ServiceConfig;

/// ```text
/// Pending ──start──▶ Starting ──healthy──▶ Running ──stop──▶ Stopping ──exit──▶ Stopped
///    │                 │  fail                │  crash          │
///    │                 └────────▶ Failed ◀────┘                 │
///    └─────────────────────────────────────────────────────────Stopped (never started)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Dynamic, per-enabled-spec record. Exclusively owned and mutated by
/// [`ServiceManager`]; every other reader goes through its accessor methods.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub spec: ServiceConfig,
    pub pid: Option<u32>,
    pub state: ServiceState,
    pub registered_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub health: Health,
    pub restart_count: u32,
    pub last_error: Option<String>,
}

impl ServiceInstance {
    pub fn new(spec: ServiceConfig) -> Self {
        Self {
            spec,
            pid: None,
            state: ServiceState::Pending,
            registered_at: None,
            last_heartbeat_at: None,
            health: Health::Unknown,
            restart_count: 0,
            last_error: None,
        }
    }

    /// `Running` is only meaningful while a pid is attached and the state
    /// agrees — this is the invariant §3 names explicitly.
    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running && self.pid.is_some()
    }
}
