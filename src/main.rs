//! vltpkg - content package registry

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vltpkg::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "vltpkg")]
#[command(about = "Register, order and extract content packages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: cli::Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "VLTPKG_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    cli::execute(cli.command, &config)
}
