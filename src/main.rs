//! pnrsi entry point.
//!
//! Provides a command-line interface for decoding PROFINET IO RSI traffic,
//! handling configuration loading, and initializing the logging subsystem.
//!
//! The configuration path can be given on the command line or through the
//! environment; the command line wins.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pnrsi::{
    capture::cli::Command,
    config::Config,
    errors::{Error, Result},
};

/// pnrsi - decoder for PROFINET IO Remote Service Interface PDUs.
///
/// Decodes captured RSI traffic, reassembling fragmented requests and responses.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "PNRSI_CONFIG",
        default_value = "/etc/pnrsi/config.yml"
    )]
    config: PathBuf,

    /// Log level.
    #[arg(long, value_name = "LEVEL", default_value = "")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Application entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    let log_level = if cli.log_level.is_empty() {
        config.log.level.clone()
    } else {
        cli.log_level.clone()
    };
    setup_logging(&log_level)?;
    cli_main(cli, config)
}

pub fn cli_main(cli: Cli, config: Config) -> Result<()> {
    cli.command.run(&config)
}

/// Configures the logging subsystem based on the specified log level.
///
/// # Arguments
/// * `level` - String representation of the desired log level
fn setup_logging(level: &str) -> Result<()> {
    let filter: EnvFilter = format!("pnrsi={level}")
        .parse()
        .map_err(|e| Error::Config(format!("invalid log level {level}: {e}")))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
    Ok(())
}
