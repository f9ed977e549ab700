use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] redb_common::CommonError),

    #[error("dependency cycle among services: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("keyring error: {0}")]
    Keyring(#[from] redb_keyring::Error),

    #[error("failed to start required service '{name}': {reason}")]
    ServiceStart { name: String, reason: String },

    #[error("service '{name}' did not become healthy within the startup budget")]
    HealthTimeout { name: String },

    #[error("rpc transport error: {0}")]
    Rpc(#[from] tonic::transport::Error),

    #[error("bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the Initializer. Kept distinct from [`Error`] so the
/// Initializer can be exercised standalone (e.g. from a future CLI
/// subcommand) without pulling in the whole supervisor error surface.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(
        "cannot reach the admin database ({0}); set REDB_POSTGRES_{{USER,PASSWORD,HOST,PORT}}"
    )]
    AdminConnection(#[source] sqlx::Error),

    #[error("database '{0}' does not exist — run --initialize first")]
    ProductionDatabaseMissing(String),

    #[error("failed to apply schema: {0}")]
    SchemaApply(#[source] sqlx::Error),

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("failed to generate node key pair: {0}")]
    KeyGeneration(String),

    #[error("keyring error during bootstrap: {0}")]
    Keyring(#[from] redb_keyring::Error),

    #[error("no local identity row found — run --initialize first")]
    MissingLocalIdentity,

    #[error("required environment variable {0} is not set (headless mode never prompts)")]
    MissingEnvVar(String),
}

pub type Result<T> = std::result::Result<T, Error>;
