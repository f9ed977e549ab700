use serde::{Deserialize, Serialize};

/// Disambiguates keyring namespaces and ports when multiple supervisors
/// coexist on one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceGroupConfig {
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Added to every configured port.
    #[serde(default)]
    pub port_offset: i32,
}

fn default_group_id() -> String {
    "default".to_string()
}

impl Default for InstanceGroupConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            port_offset: 0,
        }
    }
}
