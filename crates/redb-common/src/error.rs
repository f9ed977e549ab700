use thiserror::Error;

/// Errors shared by configuration parsing and topology computation.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error("dependency cycle detected among services: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("unknown service in depends_on: {service} depends on undefined service {dependency}")]
    UnknownDependency { service: String, dependency: String },
}

pub type Result<T> = std::result::Result<T, CommonError>;
