//! Command-line surface: a single flag set, not subcommands — the node has
//! exactly one job with two bootstrap variants.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "redb-node")]
#[command(version)]
#[command(about = "Bootstraps, spawns and supervises the fleet of services that make up a reDB node")]
pub(crate) struct Cli {
    /// Configuration file path.
    #[arg(short, long, default_value = "config.toml")]
    pub(crate) config: PathBuf,

    /// Overrides `supervisor.port` from the configuration file.
    #[arg(short, long)]
    pub(crate) port: Option<u16>,

    /// Run the interactive bootstrap pipeline (prompts on the terminal),
    /// then exit without starting the service fleet.
    #[arg(long, conflicts_with = "autoinitialize")]
    pub(crate) initialize: bool,

    /// Run the headless bootstrap pipeline (reads `REDB_POSTGRES_*` /
    /// `REDB_DEFAULT_*` environment variables, never prompts), then continue
    /// into normal startup.
    #[arg(long, conflicts_with = "initialize")]
    pub(crate) autoinitialize: bool,
}
