use serde::{Deserialize, Serialize};

/// Tenancy and other node-wide behavioural toggles.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub multi_tenancy: MultiTenancyConfig,
}

/// Whether the Initializer mints a default tenant/user or defers to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MultiTenancyMode {
    #[default]
    SingleTenant,
    MultiTenant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTenancyConfig {
    #[serde(default)]
    pub mode: MultiTenancyMode,
    #[serde(default)]
    pub default_tenant_id: String,
    #[serde(default = "default_tenant_name")]
    pub default_tenant_name: String,
    #[serde(default)]
    pub default_tenant_url: String,
}

fn default_tenant_name() -> String {
    "default".to_string()
}

impl Default for MultiTenancyConfig {
    fn default() -> Self {
        Self {
            mode: MultiTenancyMode::default(),
            default_tenant_id: String::new(),
            default_tenant_name: default_tenant_name(),
            default_tenant_url: String::new(),
        }
    }
}
