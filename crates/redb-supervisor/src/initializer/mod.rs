//! One-shot node bootstrap: database schema, cryptographic identities, and
//! the optional default tenant/user. Every step is idempotent — re-running
//! detects what is already done and skips it.

mod credential_source;
mod ddl;

pub use credential_source::{CredentialSource, DbCredentials, EnvReader, TenantAndUser, TtyPrompter};

use crate::error::BootstrapError;
use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::Rng;
use rand::distr::Alphanumeric;
use redb_common::config::{DatabaseConfig, MultiTenancyConfig, MultiTenancyMode};
use redb_common::identity::{NodeIdentity, Tenant, User};
use redb_keyring::Keyring;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub struct Initializer {
    keyring: Arc<Keyring>,
}

impl Initializer {
    pub fn new(keyring: Arc<Keyring>) -> Self {
        Self { keyring }
    }

    pub async fn run(
        &self,
        database: &DatabaseConfig,
        supervisor_port: u16,
        tenancy: &MultiTenancyConfig,
        source: &dyn CredentialSource,
    ) -> Result<NodeIdentity, BootstrapError> {
        let creds = source.database_credentials()?;

        let admin_pool = self.connect(&creds.admin_url(&database.admin_database)).await?;
        let db_password = self.ensure_db_password(&creds.database)?;
        if self.keyring.get("database", "postgres-user").is_err() {
            self.keyring.set("database", "postgres-user", creds.user.as_bytes())?;
        }
        self.ensure_production_database(&admin_pool, &creds.database, &creds.user, &db_password)
            .await?;

        let prod_pool = self
            .connect(&creds.production_url(&creds.database, &db_password))
            .await?;
        self.apply_ddl(&prod_pool).await?;

        let (public_key_pem, private_key_pem) = self.ensure_node_keypair()?;
        let ip = self.detect_local_ip();
        let node = self
            .ensure_node_identity(&prod_pool, &public_key_pem, &ip, supervisor_port)
            .await?;
        let _ = private_key_pem; // never leaves the keyring past this point

        let single_tenant = matches!(tenancy.mode, MultiTenancyMode::SingleTenant);
        if let Some(tenant_and_user) = source.tenant_and_user(single_tenant)? {
            self.ensure_tenant_and_user(&prod_pool, &tenant_and_user).await?;
        }

        Ok(node)
    }

    /// Runs on every normal startup (not just `--initialize`): confirms the
    /// bootstrap actually happened.
    pub async fn validate(&self, database: &DatabaseConfig) -> Result<(), BootstrapError> {
        let db_password = match self.keyring.get("database", "postgres-password") {
            Ok(secret) => String::from_utf8_lossy(&secret).into_owned(),
            Err(redb_keyring::Error::NotFound(_, _)) => {
                return Err(BootstrapError::ProductionDatabaseMissing(database.name.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let db_user = match self.keyring.get("database", "postgres-user") {
            Ok(secret) => String::from_utf8_lossy(&secret).into_owned(),
            Err(_) => "redb".to_string(),
        };
        let url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_password, database.host, database.port, database.name
        );
        let pool = self.connect(&url).await?;

        for table in ddl::KNOWN_TABLES {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await?;
            if !exists {
                return Err(BootstrapError::ProductionDatabaseMissing(database.name.clone()));
            }
        }

        let has_identity: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM localidentity)")
            .fetch_one(&pool)
            .await?;
        if !has_identity {
            return Err(BootstrapError::MissingLocalIdentity);
        }
        Ok(())
    }

    async fn connect(&self, url: &str) -> Result<PgPool, BootstrapError> {
        PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(BootstrapError::AdminConnection)
    }

    /// Step 2: generate (or reuse) a strong password for the production
    /// database user, stored in the keyring under the database namespace.
    fn ensure_db_password(&self, database_name: &str) -> Result<String, BootstrapError> {
        match self.keyring.get("database", "postgres-password") {
            Ok(secret) => Ok(String::from_utf8_lossy(&secret).into_owned()),
            Err(redb_keyring::Error::NotFound(_, _)) => {
                let password: String = rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(32)
                    .map(char::from)
                    .collect();
                self.keyring
                    .set("database", "postgres-password", password.as_bytes())?;
                info!(database = %database_name, "generated a new production database password");
                Ok(password)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Step 3: create the production database and role, idempotently.
    async fn ensure_production_database(
        &self,
        admin_pool: &PgPool,
        database_name: &str,
        role: &str,
        password: &str,
    ) -> Result<(), BootstrapError> {
        let role_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
                .bind(role)
                .fetch_one(admin_pool)
                .await?;
        if role_exists {
            sqlx::query(&format!(
                "ALTER ROLE \"{role}\" WITH PASSWORD '{password}'",
                role = sanitize_identifier(role)
            ))
            .execute(admin_pool)
            .await?;
        } else {
            sqlx::query(&format!(
                "CREATE ROLE \"{role}\" WITH LOGIN PASSWORD '{password}'",
                role = sanitize_identifier(role)
            ))
            .execute(admin_pool)
            .await?;
        }

        let db_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(database_name)
                .fetch_one(admin_pool)
                .await?;
        if !db_exists {
            sqlx::query(&format!(
                "CREATE DATABASE \"{db}\" OWNER \"{role}\"",
                db = sanitize_identifier(database_name),
                role = sanitize_identifier(role)
            ))
            .execute(admin_pool)
            .await?;
        } else {
            sqlx::query(&format!(
                "ALTER DATABASE \"{db}\" OWNER TO \"{role}\"",
                db = sanitize_identifier(database_name),
                role = sanitize_identifier(role)
            ))
            .execute(admin_pool)
            .await?;
        }
        Ok(())
    }

    /// Step 4: apply the DDL blob in a single transaction; detects prior
    /// application by the existence of the known table set.
    async fn apply_ddl(&self, pool: &PgPool) -> Result<(), BootstrapError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(ddl::KNOWN_TABLES[0])
        .fetch_one(pool)
        .await?;
        if exists {
            info!("schema already applied, skipping DDL");
            return Ok(());
        }

        let mut tx = pool.begin().await?;
        for statement in ddl::DDL_BLOB.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(BootstrapError::SchemaApply)?;
        }
        tx.commit().await?;
        info!("applied node schema");
        Ok(())
    }

    /// Step 5: 2048-bit RSA key pair for the node, PEM-encoded, stored under
    /// the node namespace; reused if already present.
    fn ensure_node_keypair(&self) -> Result<(String, String), BootstrapError> {
        if let (Ok(public), Ok(private)) = (
            self.keyring.get("node", "node-public-key"),
            self.keyring.get("node", "node-private-key"),
        ) {
            return Ok((
                String::from_utf8_lossy(&public).into_owned(),
                String::from_utf8_lossy(&private).into_owned(),
            ));
        }

        let (public_pem, private_pem) = generate_rsa_keypair()?;
        self.keyring.set("node", "node-public-key", public_pem.as_bytes())?;
        self.keyring.set("node", "node-private-key", private_pem.as_bytes())?;
        info!("generated node RSA key pair");
        Ok((public_pem, private_pem))
    }

    /// Step 6: detect the local IPv4 address via a UDP "connect" to a public
    /// endpoint (no packets are actually sent); falls back to loopback.
    fn detect_local_ip(&self) -> String {
        let attempt = || -> std::io::Result<String> {
            let socket = UdpSocket::bind("0.0.0.0:0")?;
            socket.set_read_timeout(Some(Duration::from_millis(200)))?;
            socket.connect("8.8.8.8:80")?;
            Ok(socket.local_addr()?.ip().to_string())
        };
        attempt().unwrap_or_else(|e| {
            warn!("could not detect local IPv4 address ({e}), falling back to loopback");
            "127.0.0.1".to_string()
        })
    }

    /// Step 7: mint a node_id (if no local identity exists yet) and claim
    /// local identity; reuses the existing identity otherwise.
    async fn ensure_node_identity(
        &self,
        pool: &PgPool,
        public_key_pem: &str,
        ip: &str,
        port: u16,
    ) -> Result<NodeIdentity, BootstrapError> {
        let mut tx = pool.begin().await?;

        if let Some(row) = sqlx::query(
            "SELECT n.node_id, n.node_name, n.public_key, n.ip, n.port, n.created_at \
             FROM localidentity l JOIN nodes n ON n.node_id = l.node_id",
        )
        .fetch_optional(&mut *tx)
        .await?
        {
            tx.commit().await?;
            let port: i32 = row.get("port");
            return Ok(NodeIdentity {
                node_id: row.get("node_id"),
                node_name: row.get("node_name"),
                public_key: row.get("public_key"),
                ip: row.get("ip"),
                port: port as u16,
                created_at: row.get("created_at"),
            });
        }

        let seq: i64 = sqlx::query_scalar("SELECT nextval('node_id_seq')")
            .fetch_one(&mut *tx)
            .await?;
        let node_id = format!("node_{seq:09}");
        let node_name = format!("redb-{}", &Uuid::new_v4().simple().to_string()[..8]);

        let row = sqlx::query(
            "INSERT INTO nodes (node_id, node_name, public_key, ip, port) \
             VALUES ($1, $2, $3, $4, $5) RETURNING created_at",
        )
        .bind(&node_id)
        .bind(&node_name)
        .bind(public_key_pem)
        .bind(ip)
        .bind(i32::from(port))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO localidentity (id, node_id) VALUES (true, $1) ON CONFLICT (id) DO NOTHING")
            .bind(&node_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(node_id = %node_id, "claimed local node identity");
        Ok(NodeIdentity {
            node_id,
            node_name,
            public_key: public_key_pem.to_string(),
            ip: ip.to_string(),
            port,
            created_at: row.get("created_at"),
        })
    }

    /// Step 8: mint tenant and user (single-tenant bootstrap, or interactive
    /// consent), an RSA key pair, and a JWT secret under the security
    /// namespace.
    async fn ensure_tenant_and_user(
        &self,
        pool: &PgPool,
        tenant_and_user: &TenantAndUser,
    ) -> Result<(), BootstrapError> {
        let tenant_url = Tenant::derive_url(&tenant_and_user.tenant_name);

        let existing: Option<(String,)> = sqlx::query_as("SELECT tenant_id FROM tenants WHERE tenant_url = $1")
            .bind(&tenant_url)
            .fetch_optional(pool)
            .await?;
        let tenant_id = if let Some((tenant_id,)) = existing {
            tenant_id
        } else {
            let tenant_id = format!("tenant_{}", Uuid::new_v4().simple());
            sqlx::query("INSERT INTO tenants (tenant_id, tenant_name, tenant_url) VALUES ($1, $2, $3)")
                .bind(&tenant_id)
                .bind(&tenant_and_user.tenant_name)
                .bind(&tenant_url)
                .execute(pool)
                .await?;
            tenant_id
        };

        let password = tenant_and_user.user_password.clone().unwrap_or_else(|| {
            let generated: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(20)
                .map(char::from)
                .collect();
            info!(password = %generated, "generated default user password (shown once)");
            generated
        });
        let password_hash =
            bcrypt::hash(&password, bcrypt::DEFAULT_COST).map_err(|e| BootstrapError::KeyGeneration(e.to_string()))?;

        let user_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE tenant_id = $1 AND email = $2)",
        )
        .bind(&tenant_id)
        .bind(&tenant_and_user.user_email)
        .fetch_one(pool)
        .await?;
        let user = User {
            user_id: format!("user_{}", Uuid::new_v4().simple()),
            tenant_id: tenant_id.clone(),
            email: tenant_and_user.user_email.clone(),
            password_hash,
        };
        if !user_exists {
            sqlx::query("INSERT INTO users (user_id, tenant_id, email, password_hash) VALUES ($1, $2, $3, $4)")
                .bind(&user.user_id)
                .bind(&user.tenant_id)
                .bind(&user.email)
                .bind(&user.password_hash)
                .execute(pool)
                .await?;
        }

        let jwt_ns = format!("security-{tenant_id}");
        if matches!(self.keyring.get(&jwt_ns, "jwt-secret"), Err(redb_keyring::Error::NotFound(_, _))) {
            let mut secret = [0u8; 64];
            rand::rng().fill(&mut secret);
            self.keyring
                .set(&jwt_ns, "jwt-secret", base64::Engine::encode(&base64::engine::general_purpose::STANDARD, secret).as_bytes())?;
        }
        if self.keyring.get(&jwt_ns, "tenant-public-key").is_err() {
            let (public_pem, private_pem) = generate_rsa_keypair()?;
            self.keyring.set(&jwt_ns, "tenant-public-key", public_pem.as_bytes())?;
            self.keyring.set(&jwt_ns, "tenant-private-key", private_pem.as_bytes())?;
        }

        Ok(())
    }
}

fn generate_rsa_keypair() -> Result<(String, String), BootstrapError> {
    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|e| BootstrapError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| BootstrapError::KeyGeneration(e.to_string()))?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| BootstrapError::KeyGeneration(e.to_string()))?;

    Ok((public_pem, private_pem.to_string()))
}

/// Defends against SQL injection through identifier interpolation: strips
/// everything but ASCII alphanumerics and underscore, since Postgres
/// identifiers can't be parameter-bound.
fn sanitize_identifier(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_').collect()
}

impl DbCredentials {
    fn admin_url(&self, admin_database: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, admin_database
        )
    }

    fn production_url(&self, database: &str, password: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, password, self.host, self.port, database
        )
    }
}
