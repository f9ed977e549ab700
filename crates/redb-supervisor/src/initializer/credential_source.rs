//! The only difference between interactive and headless bootstrap is where
//! credentials come from; everything downstream of acquisition is one
//! shared pipeline (see [`super::Initializer`]).

use crate::error::BootstrapError;
use std::io::Write;

#[derive(Debug, Clone)]
pub struct DbCredentials {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct TenantAndUser {
    pub tenant_name: String,
    pub user_email: String,
    /// `None` means "generate one and log it once".
    pub user_password: Option<String>,
}

pub trait CredentialSource: Send + Sync {
    fn database_credentials(&self) -> Result<DbCredentials, BootstrapError>;

    /// `None` means "do not create a tenant/user at all" (multi-tenant mode
    /// deferring to the out-of-scope API).
    fn tenant_and_user(&self, single_tenant: bool) -> Result<Option<TenantAndUser>, BootstrapError>;
}

/// Reads env vars named in the external interface contract; never prompts.
pub struct EnvReader;

impl EnvReader {
    fn env(name: &str) -> Result<String, BootstrapError> {
        std::env::var(name).map_err(|_| BootstrapError::MissingEnvVar(name.to_string()))
    }

    fn env_or(name: &str, default: &str) -> String {
        std::env::var(name).unwrap_or_else(|_| default.to_string())
    }
}

impl CredentialSource for EnvReader {
    fn database_credentials(&self) -> Result<DbCredentials, BootstrapError> {
        Ok(DbCredentials {
            user: Self::env("REDB_POSTGRES_USER")?,
            password: Self::env("REDB_POSTGRES_PASSWORD")?,
            host: Self::env_or("REDB_POSTGRES_HOST", "localhost"),
            port: Self::env_or("REDB_POSTGRES_PORT", "5432")
                .parse()
                .unwrap_or(5432),
            database: Self::env_or("REDB_DATABASE_NAME", "redb"),
        })
    }

    fn tenant_and_user(&self, single_tenant: bool) -> Result<Option<TenantAndUser>, BootstrapError> {
        if !single_tenant {
            return Ok(None);
        }
        let tenant_name = Self::env_or("REDB_DEFAULT_TENANT_NAME", "default");
        let user_email = Self::env_or("REDB_DEFAULT_USER_EMAIL", "admin@localhost");
        let user_password = std::env::var("REDB_DEFAULT_USER_PASSWORD").ok();
        Ok(Some(TenantAndUser {
            tenant_name,
            user_email,
            user_password,
        }))
    }
}

/// Prompts for missing values on the terminal.
pub struct TtyPrompter;

impl TtyPrompter {
    fn prompt(label: &str) -> std::io::Result<String> {
        print!("{label}: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

impl CredentialSource for TtyPrompter {
    fn database_credentials(&self) -> Result<DbCredentials, BootstrapError> {
        let user = Self::prompt("Admin database user").map_err(|_| {
            BootstrapError::MissingEnvVar("stdin (admin database user)".to_string())
        })?;
        let password = rpassword_or_plain("Admin database password");
        let host = Self::prompt("Admin database host [localhost]")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let port: u16 = Self::prompt("Admin database port [5432]")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5432);
        let database = Self::prompt("Database name [redb]")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "redb".to_string());

        Ok(DbCredentials {
            user,
            password,
            host,
            port,
            database,
        })
    }

    fn tenant_and_user(&self, single_tenant: bool) -> Result<Option<TenantAndUser>, BootstrapError> {
        if !single_tenant {
            let answer = Self::prompt("Create a default tenant and user now? [y/N]").unwrap_or_default();
            if !answer.eq_ignore_ascii_case("y") {
                return Ok(None);
            }
        }
        let tenant_name = Self::prompt("Default tenant name [default]")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());
        let user_email = Self::prompt("Default user email [admin@localhost]")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "admin@localhost".to_string());
        let user_password = Self::prompt("Default user password (blank to auto-generate)")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Some(TenantAndUser {
            tenant_name,
            user_email,
            user_password,
        }))
    }
}

fn rpassword_or_plain(label: &str) -> String {
    // No dedicated terminal-echo-suppression crate in the donor stack;
    // a plain prompt is acceptable here since this path only runs for an
    // operator at an interactive terminal during first-time setup.
    TtyPrompter::prompt(label).unwrap_or_default()
}
