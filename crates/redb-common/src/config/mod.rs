//! Node configuration: the single source of truth for how a reDB node is
//! assembled, parsed from a TOML document into a typed structure tree.
//!
//! Every section has defaults so a configuration file may omit most of it.
//! [`NodeConfig::validate`] never fails deserialization on an unknown key —
//! per the external contract, unknown keys are reported as warnings, not
//! errors.

mod database;
mod global;
mod instance_group;
mod keyring;
mod logging;
mod service;
mod supervisor;

pub use database::DatabaseConfig;
pub use global::{GlobalConfig, MultiTenancyConfig, MultiTenancyMode};
pub use instance_group::InstanceGroupConfig;
pub use keyring::{KeyringBackend, KeyringConfig};
pub use logging::LoggingConfig;
pub use service::ServiceConfig;
pub use supervisor::SupervisorConfig;

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The fully parsed, still pre-offset node configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub keyring: KeyringConfig,
    #[serde(default)]
    pub instance_group: InstanceGroupConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &[
    "global",
    "keyring",
    "instance_group",
    "supervisor",
    "logging",
    "database",
    "services",
];

/// Apply a signed offset to a port, clamped to the valid `u16` range.
fn offset_port(port: u16, offset: i32) -> u16 {
    (i32::from(port) + offset).clamp(0, i32::from(u16::MAX)) as u16
}

impl NodeConfig {
    /// Parse a configuration document from a file, warning (not failing) on
    /// unrecognised top-level keys.
    pub fn load(path: &Path) -> Result<(NodeConfig, Vec<String>)> {
        let text = std::fs::read_to_string(path).map_err(|source| CommonError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    /// Parse a configuration document from a string, returning the config
    /// plus any "Warning: " prefixed soft issues (unknown keys).
    pub fn from_str(text: &str) -> Result<(NodeConfig, Vec<String>)> {
        let mut warnings = Vec::new();
        if let Ok(toml::Value::Table(table)) = text.parse::<toml::Value>() {
            for key in table.keys() {
                if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
                    warnings.push(format!("Warning: unknown configuration key '{key}'"));
                }
            }
        }
        let config: NodeConfig = toml::from_str(text)?;
        Ok((config, warnings))
    }

    /// Apply `instance_group.port_offset` to every configured port field.
    /// Idempotent only if called once — calling twice double-applies the
    /// offset, so `SupervisorRoot` calls this exactly once right after load.
    pub fn apply_port_offset(&mut self) {
        let offset = self.instance_group.port_offset;
        self.supervisor.port = offset_port(self.supervisor.port, offset);
        for svc in &mut self.services {
            svc.port = offset_port(svc.port, offset);
        }
    }

    /// Compute the dependency-respecting startup order over enabled services.
    pub fn startup_order(&self) -> Result<Vec<String>> {
        let enabled: Vec<ServiceConfig> =
            self.services.iter().filter(|s| s.enabled).cloned().collect();
        crate::topo::startup_order(&enabled)
    }

    /// Validate required fields and cross-section invariants. Returns a list
    /// of human-readable problems; entries prefixed `"Warning: "` are soft
    /// issues, everything else is fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.instance_group.group_id.trim().is_empty() {
            errors.push("instance_group.group_id must not be empty".to_string());
        }

        if self.keyring.backend == KeyringBackend::File && self.keyring.service_name.trim().is_empty()
        {
            errors.push("Warning: keyring.service_name is empty; using the default prefix".to_string());
        }

        let mut seen_names = std::collections::HashSet::new();
        for svc in &self.services {
            if svc.name.trim().is_empty() {
                errors.push("a service entry has an empty name".to_string());
                continue;
            }
            if !seen_names.insert(svc.name.clone()) {
                errors.push(format!("duplicate service name '{}'", svc.name));
            }
            if svc.enabled && svc.binary_path.trim().is_empty() {
                errors.push(format!("service '{}' is enabled but has no binary_path", svc.name));
            }
        }

        if let Err(e) = self.startup_order() {
            errors.push(e.to_string());
        }

        if matches!(self.global.multi_tenancy.mode, MultiTenancyMode::SingleTenant)
            && self.global.multi_tenancy.default_tenant_name.trim().is_empty()
        {
            errors.push(
                "Warning: global.multi_tenancy.mode is single-tenant but default_tenant_name is empty"
                    .to_string(),
            );
        }

        errors
    }

    /// True if `validate()` reported no hard (non-"Warning: ") errors.
    pub fn is_valid(&self) -> bool {
        self.validate().iter().all(|e| e.starts_with("Warning: "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_top_level_key_is_a_warning_not_a_parse_error() {
        let doc = r#"
            [instance_group]
            group_id = "default"

            [totally_unknown_section]
            foo = 1
        "#;
        let (_config, warnings) = NodeConfig::from_str(doc).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("totally_unknown_section"));
    }

    #[test]
    fn empty_group_id_is_fatal() {
        let mut config = NodeConfig::default();
        config.instance_group.group_id.clear();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("group_id")));
        assert!(!config.is_valid());
    }

    #[test]
    fn port_offset_is_applied_to_every_port() {
        let mut config = NodeConfig::default();
        config.instance_group.port_offset = 1000;
        config.services.push(ServiceConfig::test_default("a"));
        let base_supervisor_port = config.supervisor.port;
        let base_service_port = config.services[0].port;
        config.apply_port_offset();
        assert_eq!(config.supervisor.port, base_supervisor_port + 1000);
        assert_eq!(config.services[0].port, base_service_port + 1000);
    }

    #[test]
    fn duplicate_service_names_are_rejected() {
        let mut config = NodeConfig::default();
        config.instance_group.group_id = "g".to_string();
        config.services.push(ServiceConfig::test_default("dup"));
        config.services.push(ServiceConfig::test_default("dup"));
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("duplicate service name")));
    }
}
