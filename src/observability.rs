//! Logging initialization: `RUST_LOG` always takes precedence over
//! `logging.level`; `logging.file`, when set, adds a daily-rotating file
//! layer alongside the stderr layer rather than replacing it.

use crate::error::Result;
use redb_common::config::LoggingConfig;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Holds the non-blocking file writer's worker thread alive for the process
/// lifetime; dropping it flushes pending log lines.
#[derive(Default)]
pub struct ObservabilityGuard {
    log_guard: Option<WorkerGuard>,
}

fn create_env_filter(config: &LoggingConfig) -> EnvFilter {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| config.level.clone());

    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_observability(config: &LoggingConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();

    let file_layer = if config.file.is_empty() {
        None
    } else {
        fs::create_dir_all(&config.file)?;
        let file_appender = tracing_appender::rolling::daily(&config.file, "redb-node.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard.log_guard = Some(worker_guard);
        Some(fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking))
    };

    tracing_subscriber::registry()
        .with(create_env_filter(config))
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .try_init()
        .ok();

    Ok(guard)
}
