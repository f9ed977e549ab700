use serde::{Deserialize, Serialize};

/// Backing store used by the Initializer on normal startup, read verbatim
/// from the config file. The `REDB_POSTGRES_{USER,PASSWORD,HOST,PORT,DATABASE}`
/// environment variables are a separate, bootstrap-only path: `EnvReader`
/// (see `initializer/credential_source.rs`) reads them directly for
/// `--autoinitialize`, they do not override this struct's fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_admin_database")]
    pub admin_database: String,
}

fn default_name() -> String {
    "redb".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_admin_database() -> String {
    "postgres".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            host: default_host(),
            port: default_port(),
            admin_database: default_admin_database(),
        }
    }
}
