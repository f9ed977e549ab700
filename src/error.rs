//! Top-level error type aggregating every subsystem the binary touches.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] redb_common::CommonError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] redb_supervisor::Error),

    #[error("keyring error: {0}")]
    Keyring(#[from] redb_keyring::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Custom { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }
}
