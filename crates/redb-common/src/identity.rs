//! Value types for node and tenant identity. Persistence and generation live
//! in the Initializer (`redb-supervisor`); this crate only defines the
//! shapes so `redb-common`, `redb-keyring`, and `redb-supervisor` share one
//! vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node's durable identity, created once by the Initializer and read-only
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Monotone, prefixed unique identifier (e.g. `node_000000001`).
    pub node_id: String,
    pub node_name: String,
    /// PEM-encoded RSA public key.
    pub public_key: String,
    pub ip: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
}

/// A tenant minted by the Initializer (single-tenant bootstrap or, in
/// multi-tenant mode, deferred to the out-of-scope API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub tenant_name: String,
    /// Derived from `tenant_name`: non-alphanumeric characters stripped.
    pub tenant_url: String,
}

impl Tenant {
    /// Derive the URL-safe slug from a tenant name: alphanumerics only,
    /// lowercased.
    pub fn derive_url(tenant_name: &str) -> String {
        tenant_name
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect()
    }
}

/// The default administrative user created alongside a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub tenant_id: String,
    pub email: String,
    /// bcrypt hash; the plaintext password never leaves the Initializer.
    pub password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_url_strips_non_alphanumerics() {
        assert_eq!(Tenant::derive_url("Acme, Inc."), "acmeinc");
        assert_eq!(Tenant::derive_url("my-tenant_01"), "mytenant01");
    }
}
