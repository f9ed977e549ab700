use crate::backend::Backend;
use crate::error::Result;
use crate::file::FileBackend;
use crate::system::SystemBackend;
use std::path::Path;
use tracing::warn;

/// Tries the system backend first; on unavailability falls back to the file
/// backend for the remainder of the process lifetime.
pub enum AutoBackend {
    System(SystemBackend),
    File(FileBackend),
}

impl AutoBackend {
    pub fn new(file_path: &Path, master_key: &str) -> Result<Self> {
        match SystemBackend::probe() {
            Ok(()) => Ok(Self::System(SystemBackend::new())),
            Err(e) => {
                warn!("system keyring unavailable ({e}); falling back to file backend");
                Ok(Self::File(FileBackend::open(file_path, master_key)?))
            }
        }
    }
}

impl Backend for AutoBackend {
    fn get(&self, namespace: &str, key: &str) -> Result<Vec<u8>> {
        match self {
            Self::System(b) => b.get(namespace, key),
            Self::File(b) => b.get(namespace, key),
        }
    }

    fn set(&self, namespace: &str, key: &str, secret: &[u8]) -> Result<()> {
        match self {
            Self::System(b) => b.set(namespace, key, secret),
            Self::File(b) => b.set(namespace, key, secret),
        }
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        match self {
            Self::System(b) => b.delete(namespace, key),
            Self::File(b) => b.delete(namespace, key),
        }
    }
}
