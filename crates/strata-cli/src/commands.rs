use std::path::Path;

use anyhow::{anyhow, Context};
use colored::Colorize;
use strata_server::{ServerConfig, StrataServer};
use tracing::Level;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args, cli.verbose).await,
        Command::Config(args) => cmd_config(config, args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

fn apply_overrides(config: &mut ServerConfig, args: &ServeArgs) {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(interval) = args.gc_interval {
        config.core.gc_interval_secs = interval;
    }
    if args.no_local_storage {
        config.local_storage = false;
    }
}

fn log_level(config: &ServerConfig, verbose: bool) -> anyhow::Result<Level> {
    if verbose {
        return Ok(Level::DEBUG);
    }
    config
        .log_level
        .parse()
        .map_err(|_| anyhow!("invalid log level {:?}", config.log_level))
}

async fn cmd_serve(mut config: ServerConfig, args: ServeArgs, verbose: bool) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;
    tracing_subscriber::fmt()
        .with_max_level(log_level(&config, verbose)?)
        .try_init()
        .map_err(|e| anyhow!("cannot install log subscriber: {e}"))?;

    println!(
        "{} Strata server on {} (default branch {}, bucket {})",
        "✓".green().bold(),
        config.bind_addr.to_string().bold(),
        config.core.default_branch.yellow(),
        config.core.bucket.cyan()
    );
    if config.local_storage {
        println!("  Storage endpoint: {}", config.core.endpoint.blue());
    }
    StrataServer::new(config)?.serve().await?;
    Ok(())
}

fn cmd_config(config: ServerConfig, args: ConfigArgs) -> anyhow::Result<()> {
    config.validate()?;
    if args.check {
        println!("{} Configuration is valid", "✓".green().bold());
    } else {
        print!("{}", config.to_toml_string()?);
    }
    Ok(())
}
