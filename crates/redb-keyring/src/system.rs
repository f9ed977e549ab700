use crate::backend::Backend;
use crate::error::{Error, Result};

/// Delegates to the platform credential store via the `keyring` crate. A
/// namespaced key is addressed as `(service = rewritten namespace,
/// account = key_name)`.
pub struct SystemBackend;

impl SystemBackend {
    pub fn new() -> Self {
        Self
    }

    fn entry(namespace: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(namespace, key).map_err(|e| Error::Backend(e.to_string()))
    }

    /// Round-trip a sentinel entry to confirm the host credential store is
    /// reachable, used by [`crate::auto::AutoBackend`] at construction.
    pub fn probe() -> Result<()> {
        let backend = Self::new();
        backend.set("redb-probe", "probe", b"probe")?;
        backend.get("redb-probe", "probe")?;
        backend.delete("redb-probe", "probe")
    }
}

impl Default for SystemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SystemBackend {
    fn get(&self, namespace: &str, key: &str) -> Result<Vec<u8>> {
        let entry = Self::entry(namespace, key)?;
        match entry.get_secret() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => {
                Err(Error::NotFound(namespace.to_string(), key.to_string()))
            }
            Err(e) => Err(Error::Backend(e.to_string())),
        }
    }

    fn set(&self, namespace: &str, key: &str, secret: &[u8]) -> Result<()> {
        let entry = Self::entry(namespace, key)?;
        entry
            .set_secret(secret)
            .map_err(|e| Error::Backend(e.to_string()))
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let entry = Self::entry(namespace, key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Backend(e.to_string())),
        }
    }
}
