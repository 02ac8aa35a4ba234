#![deny(unsafe_code)]

//! handoffd: the launch daemon.
//!
//! Registers the channel, runs any command forwarded by the client that
//! started it, and spawns every command it is handed until told to exit.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use handoff_config::AppConfig;
use handoff_core::autostart;
use handoff_core::{Daemon, StampedFormat};

/// The handoff launch daemon.
#[derive(Parser, Debug)]
#[command(name = "handoffd", version = handoff_core::build_info::VERSION_LINE, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "handoff.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate the configuration, print it resolved, and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // Logging may not be up yet.
            eprintln!("handoffd: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load_or_default(&cli.config)
        .await
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;

    if cli.check_config {
        let resolved = toml::to_string_pretty(&config).context("failed to render configuration")?;
        println!("{resolved}");
        return Ok(ExitCode::SUCCESS);
    }

    let level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .event_format(StampedFormat)
        .init();
    debug!(build = %handoff_core::build_info::long_version(), "build info");

    let pending = autostart::take_pending_command();
    let daemon = Daemon::new(config).with_pending_command(pending);
    match daemon.run().await {
        Ok(status) => {
            debug!(?status, "dispatch loop ended");
            Ok(ExitCode::from(status.exit_code()))
        }
        Err(e) => {
            error!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
