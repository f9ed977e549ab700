use serde::{Deserialize, Serialize};

/// The supervisor's own RPC listen configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Listen port, subject to `instance_group.port_offset`. Default base is
    /// 50000.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    50000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}
