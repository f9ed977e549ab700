use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Distinguished "missing key" outcome — never treated as an I/O error.
    #[error("no secret found for ({0}, {1})")]
    NotFound(String, String),

    #[error("keyring backend error: {0}")]
    Backend(String),

    #[error("keyring encryption error: {0}")]
    Crypto(String),

    #[error("keyring I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("keyring serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(
        "no master key configured for the file keyring backend; set REDB_KEYRING_PASSWORD or keyring.master_key"
    )]
    MissingMasterKey,
}

pub type Result<T> = std::result::Result<T, Error>;
