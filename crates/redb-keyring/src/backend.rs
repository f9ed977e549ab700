use crate::error::Result;

/// The one contract every backend implements. Namespaces passed here are
/// already rewritten by [`crate::Keyring`] — backends never see the logical
/// (pre-rewrite) namespace.
pub trait Backend: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Vec<u8>>;
    fn set(&self, namespace: &str, key: &str, secret: &[u8]) -> Result<()>;
    fn delete(&self, namespace: &str, key: &str) -> Result<()>;
}
