//! The `exec` handler: decode a command line and spawn it detached.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::process::Stdio;

use chrono::{DateTime, Local};
use handoff_config::DaemonConfig;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{DispatchContext, Handler, HandlerError};
use crate::autostart::PENDING_COMMAND_VAR;
use crate::cmdline::{self, SplitLimits};
use crate::logging::SPAWN_TARGET;
use crate::ipc::Topic;
use crate::paths::{self, DrivePathTranslator, PathTranslator};

/// A process started by the exec handler.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub pid: u32,
    pub argv: Vec<Vec<u8>>,
    pub started_at: DateTime<Local>,
}

impl LaunchRecord {
    /// The argument vector re-encoded for display.
    pub fn command_line(&self) -> String {
        cmdline::escape_args(&self.argv)
    }
}

/// Spawns the decoded command line of each `exec` payload.
pub struct ExecHandler {
    max_args: usize,
    translator: Box<dyn PathTranslator>,
}

impl ExecHandler {
    pub fn new(max_args: usize, translator: Box<dyn PathTranslator>) -> Self {
        Self { max_args, translator }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(
            config.max_args,
            Box::new(DrivePathTranslator::new(&config.drive_root)),
        )
    }

    /// Decode `payload` into the argument vector that would be spawned.
    pub fn prepare(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>, HandlerError> {
        let args = cmdline::split(payload, SplitLimits::for_input(payload, self.max_args))?;
        if args.is_empty() {
            return Err(HandlerError::NullCommand);
        }
        Ok(args
            .iter()
            .map(|arg| match paths::bracketed(arg) {
                Some(inner) => {
                    let translated = self.translator.translate(inner);
                    debug!(
                        from = %String::from_utf8_lossy(inner),
                        to = %String::from_utf8_lossy(&translated),
                        "path translated"
                    );
                    translated
                }
                None => arg.to_vec(),
            })
            .collect())
    }

    /// Decode, spawn, and log one command. Must run inside a tokio runtime.
    pub fn launch(&self, payload: &[u8]) -> Result<LaunchRecord, HandlerError> {
        let argv = match self.prepare(payload) {
            Ok(argv) => argv,
            Err(HandlerError::NullCommand) => {
                warn!("null command ignored");
                return Err(HandlerError::NullCommand);
            }
            Err(e) => {
                error!(payload = %String::from_utf8_lossy(payload), "command execution failed: {e}");
                return Err(e);
            }
        };

        let mut std_cmd = std::process::Command::new(OsStr::from_bytes(&argv[0]));
        std_cmd
            .args(argv[1..].iter().map(|a| OsStr::from_bytes(a)))
            .env_remove(PENDING_COMMAND_VAR)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .process_group(0);
        let child = Command::from(std_cmd).spawn();

        let command = cmdline::escape_args(&argv);
        match child {
            Ok(child) => {
                // Detached: never waited on, reaped by the runtime.
                let pid = child.id().unwrap_or_default();
                info!(target: SPAWN_TARGET, pid, "{command}");
                Ok(LaunchRecord {
                    pid,
                    argv,
                    started_at: Local::now(),
                })
            }
            Err(source) => {
                error!(command = %command, error = %source, "spawn failed");
                Err(HandlerError::Spawn { command, source })
            }
        }
    }
}

impl Handler for ExecHandler {
    fn topic(&self) -> Topic {
        Topic::Exec
    }

    fn handle(&self, payload: &[u8], _ctx: &DispatchContext) -> Result<(), HandlerError> {
        self.launch(payload).map(|_| ())
    }
}
