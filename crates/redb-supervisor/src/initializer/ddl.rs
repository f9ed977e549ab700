//! The fixed schema+indexes blob the Initializer applies once to a fresh
//! production database. Evolving this schema is explicitly out of scope for
//! the supervisor core — it is shipped, not migrated.

pub const DDL_BLOB: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    node_id TEXT PRIMARY KEY,
    node_name TEXT NOT NULL,
    public_key TEXT NOT NULL,
    ip TEXT NOT NULL,
    port INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS localidentity (
    id BOOLEAN PRIMARY KEY DEFAULT true CHECK (id),
    node_id TEXT NOT NULL REFERENCES nodes(node_id)
);

CREATE SEQUENCE IF NOT EXISTS node_id_seq;

CREATE TABLE IF NOT EXISTS tenants (
    tenant_id TEXT PRIMARY KEY,
    tenant_name TEXT NOT NULL,
    tenant_url TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(tenant_id),
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tenant_id, email)
);

CREATE INDEX IF NOT EXISTS idx_users_tenant_id ON users(tenant_id);
"#;

/// Tables whose presence means the DDL blob has already been applied.
pub const KNOWN_TABLES: &[&str] = &["nodes", "localidentity", "tenants", "users"];
