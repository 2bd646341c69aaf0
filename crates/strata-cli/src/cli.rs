use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: versioned project storage with branches, locks and presigned blobs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the Strata server
    Serve(ServeArgs),
    /// Print or check the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Default)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// error, warn, info, debug or trace
    #[arg(long)]
    pub log_level: Option<String>,
    /// Seconds between background garbage-collection passes; 0 disables them
    #[arg(long)]
    pub gc_interval: Option<u64>,
    /// Do not answer presigned storage URLs from this process
    #[arg(long)]
    pub no_local_storage: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Only validate; print nothing but the verdict
    #[arg(long)]
    pub check: bool,
}
