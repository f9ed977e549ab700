use serde::{Deserialize, Serialize};

/// Log filter level and LogStore retention.
///
/// `level` accepts anything `tracing_subscriber::EnvFilter` accepts
/// (`info`, `debug`, `module=trace`, ...); an explicit `RUST_LOG` environment
/// variable always takes precedence over this value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Directory for rotating log files. Empty means stderr-only.
    #[serde(default)]
    pub file: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_retention_days() -> u32 {
    7
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            retention_days: default_retention_days(),
            file: String::new(),
        }
    }
}
