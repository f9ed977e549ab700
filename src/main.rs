mod cli;
mod error;
mod observability;

use clap::Parser;
use cli::Cli;
use error::{Error, Result};
use observability::init_observability;
use redb_common::NodeConfig;
use redb_keyring::Keyring;
use redb_supervisor::{EnvReader, SupervisorRoot, TtyPrompter};
use std::path::{Path, PathBuf};
use tracing::{error, info};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = find_config_file(&cli.config)?;
    let (mut config, warnings) = NodeConfig::load(&config_path)?;
    for warning in &warnings {
        println!("{warning}");
    }

    let hard_errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|e| !e.starts_with("Warning: "))
        .collect();
    if !hard_errors.is_empty() {
        for e in &hard_errors {
            eprintln!("config error: {e}");
        }
        return Err(Error::custom("configuration validation failed"));
    }

    config.apply_port_offset();
    if let Some(port) = cli.port {
        config.supervisor.port = port;
    }

    let _observability_guard = init_observability(&config.logging)?;

    let keyring = std::sync::Arc::new(Keyring::from_config(&config.keyring, &config.instance_group.group_id)?);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run_async(config, keyring, cli.initialize, cli.autoinitialize))
}

async fn run_async(
    config: NodeConfig,
    keyring: std::sync::Arc<Keyring>,
    initialize: bool,
    autoinitialize: bool,
) -> Result<()> {
    let mut root = SupervisorRoot::new(config, keyring)?;

    if initialize {
        info!("running interactive bootstrap");
        root.initialize(&TtyPrompter).await?;
        info!("bootstrap complete, exiting");
        return Ok(());
    }

    if autoinitialize {
        info!("running headless bootstrap");
        root.initialize(&EnvReader).await?;
    } else {
        root.validate_bootstrap().await?;
    }

    root.spawn_signal_handler();
    if let Err(e) = root.start().await {
        error!("startup failed, running shutdown before exiting: {e}");
        root.shutdown().await;
        return Err(e.into());
    }

    root.wait_for_shutdown_signal().await;
    root.shutdown().await;
    Ok(())
}

fn find_config_file(provided: &Path) -> Result<PathBuf> {
    if provided != Path::new("config.toml") {
        return if provided.exists() {
            Ok(provided.to_path_buf())
        } else {
            Err(Error::custom(format!("config file not found: {}", provided.display())))
        };
    }

    for candidate in [PathBuf::from("config.toml"), PathBuf::from("/etc/redb/config.toml")] {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(Error::custom(
        "no configuration file found; create config.toml or pass --config <path>",
    ))
}
