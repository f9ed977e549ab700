use serde::{Deserialize, Serialize};

/// Selects which secret-storage backend the keyring uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyringBackend {
    /// Host credential store (Secret Service / Keychain / Credential Manager).
    System,
    /// Encrypted local file.
    File,
    /// Try `System`; fall back to `File` if the host store is unavailable.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringConfig {
    #[serde(default)]
    pub backend: KeyringBackend,
    /// File-backend container path. Defaults to
    /// `~/.local/share/redb/keyring-<group_id>.redbkey` when empty.
    #[serde(default)]
    pub path: String,
    /// Master key for the file backend. `REDB_KEYRING_PASSWORD` always
    /// overrides this when set.
    #[serde(default)]
    pub master_key: String,
    /// Prefix used when rewriting logical namespaces; see the namespacing
    /// rule in the keyring crate.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "redb".to_string()
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            backend: KeyringBackend::default(),
            path: String::new(),
            master_key: String::new(),
            service_name: default_service_name(),
        }
    }
}
