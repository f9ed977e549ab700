//! Scoped acquisition and persistence of secrets across backends.
//!
//! `Keyring` is the process-wide singleton every namespace (database
//! credentials, node identity keys, per-tenant JWT secrets) goes through.
//! Namespaces are transparently rewritten so two supervisor instances on one
//! host never collide; see [`namespace::rewrite`].

mod auto;
mod backend;
mod error;
mod file;
mod namespace;
mod system;

pub use error::{Error, Result};

use auto::AutoBackend;
use backend::Backend;
use file::FileBackend;
use redb_common::config::{KeyringBackend, KeyringConfig};
use system::SystemBackend;

enum Inner {
    System(SystemBackend),
    File(FileBackend),
    Auto(AutoBackend),
}

impl Backend for Inner {
    fn get(&self, namespace: &str, key: &str) -> Result<Vec<u8>> {
        match self {
            Self::System(b) => b.get(namespace, key),
            Self::File(b) => b.get(namespace, key),
            Self::Auto(b) => b.get(namespace, key),
        }
    }

    fn set(&self, namespace: &str, key: &str, secret: &[u8]) -> Result<()> {
        match self {
            Self::System(b) => b.set(namespace, key, secret),
            Self::File(b) => b.set(namespace, key, secret),
            Self::Auto(b) => b.set(namespace, key, secret),
        }
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        match self {
            Self::System(b) => b.delete(namespace, key),
            Self::File(b) => b.delete(namespace, key),
            Self::Auto(b) => b.delete(namespace, key),
        }
    }
}

/// Process-wide secret store. Construct once at `SupervisorRoot` init time,
/// share via `Arc`, release explicitly in shutdown phase 5.
pub struct Keyring {
    service_name_prefix: String,
    group_id: String,
    inner: Inner,
}

impl Keyring {
    /// Build the keyring from node configuration. `REDB_KEYRING_PASSWORD`
    /// takes precedence over `config.master_key` for the file backend;
    /// `REDB_KEYRING_PATH` takes precedence over `config.path`.
    pub fn from_config(config: &KeyringConfig, group_id: &str) -> Result<Self> {
        let master_key = std::env::var("REDB_KEYRING_PASSWORD")
            .unwrap_or_else(|_| config.master_key.clone());
        if matches!(config.backend, KeyringBackend::File | KeyringBackend::Auto) && master_key.is_empty()
        {
            return Err(Error::MissingMasterKey);
        }

        let path = std::env::var("REDB_KEYRING_PATH")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| Self::default_file_path(group_id, &config.path));

        let inner = match config.backend {
            KeyringBackend::System => Inner::System(SystemBackend::new()),
            KeyringBackend::File => Inner::File(FileBackend::open(&path, &master_key)?),
            KeyringBackend::Auto => Inner::Auto(AutoBackend::new(&path, &master_key)?),
        };

        Ok(Self {
            service_name_prefix: if config.service_name.is_empty() {
                "redb".to_string()
            } else {
                config.service_name.clone()
            },
            group_id: group_id.to_string(),
            inner,
        })
    }

    fn default_file_path(group_id: &str, configured: &str) -> std::path::PathBuf {
        if !configured.is_empty() {
            return std::path::PathBuf::from(configured);
        }
        let base = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        base.join("redb")
            .join(format!("keyring-{group_id}.redbkey"))
    }

    fn namespace(&self, ns: &str) -> String {
        namespace::rewrite(&self.service_name_prefix, &self.group_id, ns)
    }

    pub fn get(&self, ns: &str, key: &str) -> Result<Vec<u8>> {
        self.inner.get(&self.namespace(ns), key)
    }

    pub fn set(&self, ns: &str, key: &str, secret: &[u8]) -> Result<()> {
        self.inner.set(&self.namespace(ns), key, secret)
    }

    pub fn delete(&self, ns: &str, key: &str) -> Result<()> {
        self.inner.delete(&self.namespace(ns), key)
    }

    /// Release any resources held by the backend. Currently a no-op for
    /// every backend (no open file handles are retained between calls), but
    /// kept as an explicit step so shutdown phase 5 has one thing to call
    /// regardless of backend.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(path: &std::path::Path) -> KeyringConfig {
        KeyringConfig {
            backend: KeyringBackend::File,
            path: path.to_string_lossy().into_owned(),
            master_key: "test-master-key".to_string(),
            service_name: "redb".to_string(),
        }
    }

    #[test]
    #[serial_test::serial]
    fn namespaces_for_different_groups_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let keyring_a = Keyring::from_config(&file_config(&dir.path().join("a.redbkey")), "group-a").unwrap();
        let keyring_b = Keyring::from_config(&file_config(&dir.path().join("b.redbkey")), "group-b").unwrap();
        keyring_a.set("database", "password", b"secret-a").unwrap();
        keyring_b.set("database", "password", b"secret-b").unwrap();
        assert_eq!(keyring_a.get("database", "password").unwrap(), b"secret-a");
        assert_eq!(keyring_b.get("database", "password").unwrap(), b"secret-b");
    }

    #[test]
    #[serial_test::serial]
    fn get_after_delete_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let keyring = Keyring::from_config(&file_config(&dir.path().join("k.redbkey")), "g").unwrap();
        keyring.set("ns", "k", b"v").unwrap();
        keyring.delete("ns", "k").unwrap();
        assert!(matches!(keyring.get("ns", "k"), Err(Error::NotFound(_, _))));
    }

    #[test]
    #[serial_test::serial]
    fn missing_master_key_for_file_backend_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = file_config(&dir.path().join("k.redbkey"));
        config.master_key.clear();
        assert!(matches!(
            Keyring::from_config(&config, "g"),
            Err(Error::MissingMasterKey)
        ));
    }
}
