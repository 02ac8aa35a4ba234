#![deny(unsafe_code)]

//! handoff: hand a command line to the handoffd daemon.
//!
//! ```text
//! handoff notepad '[C:\Users\me\todo.txt]'
//! handoff --exit
//! ```

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use handoff_config::AppConfig;
use handoff_core::autostart::{CommandStarter, DAEMON_COMMAND_VAR};
use handoff_core::cmdline::{self, EncodeError};
use handoff_core::ipc::{Client, Delivery, Topic, UnixConnector};

const DEFAULT_CONFIG: &str = "handoff.toml";

/// Exit code for IPC and platform failures.
const EXIT_FAILURE: u8 = 1;
/// Exit code for usage errors, matching clap's.
const EXIT_USAGE: u8 = 2;

/// Hand a command line to the handoffd daemon, starting it if needed.
#[derive(Parser, Debug)]
#[command(name = "handoff", version = handoff_core::build_info::VERSION_LINE, about, long_about = None)]
struct Cli {
    /// Path to configuration file [default: handoff.toml].
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Ask the daemon to shut down.
    #[arg(short, long, conflicts_with_all = ["list_topics", "command"])]
    exit: bool,

    /// List the (service, topic) pairs the daemon serves.
    #[arg(short, long, conflicts_with = "command")]
    list_topics: bool,

    /// Print topics as JSON (with --list-topics).
    #[arg(long, requires = "list_topics")]
    json: bool,

    /// Print the encoded command line instead of sending it.
    #[arg(long, conflicts_with_all = ["exit", "list_topics"])]
    print: bool,

    /// The command and its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<OsString>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = AppConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    if cli.list_topics {
        return list_topics(&config, cli.json).await;
    }

    let (topic, payload) = if cli.exit {
        (Topic::Exit, String::new())
    } else {
        match encode_command(&cli.command) {
            Ok(payload) => (Topic::Exec, payload),
            Err(message) => {
                error!("{message}");
                return Ok(ExitCode::from(EXIT_USAGE));
            }
        }
    };

    if cli.print {
        println!("{payload}");
        return Ok(ExitCode::SUCCESS);
    }

    let client = build_client(&config, cli.config.as_deref())?;
    match client.send(topic, &payload).await {
        Ok(delivery) => {
            match delivery {
                Delivery::Acknowledged => debug!(%topic, "acknowledged"),
                Delivery::AlreadyStopped => debug!("nothing to stop"),
                Delivery::DaemonStarted { pid } => debug!(daemon_pid = pid, "daemon started"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e}");
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

/// Encode the trailing arguments into one transport payload.
fn encode_command(command: &[OsString]) -> Result<String, String> {
    if command.is_empty() {
        return Err("no command given (see --help)".to_string());
    }
    cmdline::encode_payload(command.iter().map(|arg| arg.as_bytes())).map_err(|e| match e {
        EncodeError::TooLong { capacity } => {
            format!("command line too long: the encoded form must fit in {capacity} bytes")
        }
    })
}

fn build_client(config: &AppConfig, explicit_config: Option<&Path>) -> Result<Client> {
    let connector = UnixConnector::from_config(config);
    debug!(socket = %connector.socket_path().display(), "using channel");

    let timeout = Duration::from_millis(config.client.timeout_ms);
    let client = Client::new(Box::new(connector), timeout);
    if !config.client.autostart {
        return Ok(client);
    }

    let starter = CommandStarter::resolve(
        std::env::var_os(DAEMON_COMMAND_VAR),
        config.client.daemon_command.as_deref(),
        || default_daemon_command(explicit_config),
    )
    .context("invalid daemon command")?;
    Ok(client.with_autostart(Box::new(starter)))
}

/// `handoffd` next to this executable, with the client's config forwarded.
fn default_daemon_command(explicit_config: Option<&Path>) -> Vec<OsString> {
    let program = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("handoffd")))
        .filter(|path| path.exists())
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("handoffd"));

    let mut argv = vec![program];
    if let Some(path) = explicit_config.filter(|p| p.exists()) {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        argv.push(OsString::from("--config"));
        argv.push(path.into_os_string());
    }
    argv
}

async fn list_topics(config: &AppConfig, json: bool) -> Result<ExitCode> {
    let connector = UnixConnector::from_config(config);
    let timeout = Duration::from_millis(config.client.timeout_ms);
    let client = Client::new(Box::new(connector), timeout);

    let pairs = match client.discover().await {
        Ok(pairs) => pairs,
        Err(e) => {
            error!("{e}");
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
    } else {
        for pair in pairs {
            println!("{}\t{}", pair.service, pair.topic);
        }
    }
    Ok(ExitCode::SUCCESS)
}
