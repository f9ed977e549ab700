use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static, per-configured-service specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub binary_path: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Default port before `instance_group.port_offset` is applied.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Relative health-check path or identifier used for active probes.
    #[serde(default)]
    pub health_endpoint: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl ServiceConfig {
    /// Build a minimal spec with every optional field defaulted, for use in
    /// tests that only care about name and dependency wiring.
    #[doc(hidden)]
    pub fn test_default(name: &str) -> Self {
        Self {
            name: name.to_string(),
            binary_path: format!("/usr/local/bin/redb-{name}"),
            args: Vec::new(),
            port: 50051,
            required: true,
            enabled: true,
            depends_on: Vec::new(),
            health_endpoint: String::new(),
            env: BTreeMap::new(),
        }
    }
}
