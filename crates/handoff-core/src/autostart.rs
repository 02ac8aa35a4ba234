//! Starting a daemon on demand, and handing it the command that triggered
//! the start.
//!
//! When an `exec` request finds nobody listening, the client starts a daemon
//! itself and passes the encoded command in [`PENDING_COMMAND_VAR`]. The
//! daemon reads that variable once at startup, runs the command as its
//! first action, and never passes the variable on to the processes it
//! spawns.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::cmdline::{self, SplitError, SplitLimits};

/// Side channel carrying a command queued before the daemon existed.
pub const PENDING_COMMAND_VAR: &str = "HANDOFF_PENDING_COMMAND";

/// Encoded command line that replaces the built-in daemon command.
pub const DAEMON_COMMAND_VAR: &str = "HANDOFF_DAEMON";

/// Argument cap when splitting a daemon command line.
const MAX_DAEMON_ARGS: usize = 64;

/// Errors from starting a daemon.
#[derive(Debug, thiserror::Error)]
pub enum AutostartError {
    #[error("daemon command is empty")]
    EmptyCommand,

    #[error("invalid daemon command: {0}")]
    Split(#[from] SplitError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Starts a daemon that will run `pending` once it is up.
pub trait DaemonStarter: Send + Sync {
    /// Start the daemon and return its process id.
    fn start(&self, pending: &str) -> Result<u32, AutostartError>;
}

/// Starts the daemon by spawning a detached process.
#[derive(Debug, Clone)]
pub struct CommandStarter {
    argv: Vec<OsString>,
}

impl CommandStarter {
    pub fn new(argv: Vec<OsString>) -> Result<Self, AutostartError> {
        if argv.is_empty() {
            return Err(AutostartError::EmptyCommand);
        }
        Ok(Self { argv })
    }

    /// Build from an encoded command line such as `/opt/bin/handoffd -v`.
    pub fn from_command_line(line: &[u8]) -> Result<Self, AutostartError> {
        let args = cmdline::split(line, SplitLimits::for_input(line, MAX_DAEMON_ARGS))?;
        Self::new(args.iter().map(|a| OsStr::from_bytes(a).to_os_string()).collect())
    }

    /// Pick the daemon command: the [`DAEMON_COMMAND_VAR`] override, then
    /// the configured command line, then `fallback`.
    pub fn resolve(
        env_override: Option<OsString>,
        configured: Option<&str>,
        fallback: impl FnOnce() -> Vec<OsString>,
    ) -> Result<Self, AutostartError> {
        if let Some(line) = env_override.filter(|l| !l.is_empty()) {
            debug!(source = DAEMON_COMMAND_VAR, "using daemon command override");
            return Self::from_command_line(line.as_bytes());
        }
        if let Some(line) = configured {
            return Self::from_command_line(line.as_bytes());
        }
        Self::new(fallback())
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }
}

impl DaemonStarter for CommandStarter {
    fn start(&self, pending: &str) -> Result<u32, AutostartError> {
        let program = &self.argv[0];
        let child = Command::new(program)
            .args(&self.argv[1..])
            .env(PENDING_COMMAND_VAR, pending)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(|source| AutostartError::Spawn {
                program: program.to_string_lossy().into_owned(),
                source,
            })?;

        // The daemon outlives us; it is never waited on.
        Ok(child.id())
    }
}

static PENDING_TAKEN: AtomicBool = AtomicBool::new(false);

/// Read the forwarded command from the environment. Only the first call in
/// a process can return a command.
pub fn take_pending_command() -> Option<String> {
    if PENDING_TAKEN.swap(true, Ordering::SeqCst) {
        return None;
    }
    pending_command_from(|name| std::env::var(name).ok())
}

/// Read the forwarded command through `lookup`. Blank values count as absent.
pub fn pending_command_from(lookup: impl FnOnce(&str) -> Option<String>) -> Option<String> {
    lookup(PENDING_COMMAND_VAR).filter(|cmd| !cmd.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_line_is_split() {
        let starter = CommandStarter::from_command_line(br#"/opt/handoff/handoffd --config "my conf.toml""#)
            .unwrap();
        assert_eq!(
            starter.argv(),
            [
                OsString::from("/opt/handoff/handoffd"),
                OsString::from("--config"),
                OsString::from("my conf.toml"),
            ]
        );
    }

    #[test]
    fn test_blank_command_line_rejected() {
        assert!(matches!(
            CommandStarter::from_command_line(b"   "),
            Err(AutostartError::EmptyCommand)
        ));
    }

    #[test]
    fn test_resolve_prefers_env_override() {
        let starter = CommandStarter::resolve(
            Some(OsString::from("custom-daemon -x")),
            Some("configured-daemon"),
            || vec![OsString::from("fallback")],
        )
        .unwrap();
        assert_eq!(starter.argv()[0], "custom-daemon");
        assert_eq!(starter.argv().len(), 2);
    }

    #[test]
    fn test_resolve_uses_config_then_fallback() {
        let configured =
            CommandStarter::resolve(None, Some("configured-daemon"), || vec![OsString::from("fallback")])
                .unwrap();
        assert_eq!(configured.argv()[0], "configured-daemon");

        let fallback = CommandStarter::resolve(Some(OsString::new()), None, || {
            vec![OsString::from("fallback")]
        })
        .unwrap();
        assert_eq!(fallback.argv()[0], "fallback");
    }

    #[test]
    fn test_start_reports_spawn_failure() {
        let starter = CommandStarter::new(vec![OsString::from("/nonexistent/handoffd")]).unwrap();
        let err = starter.start("echo hi").unwrap_err();
        assert!(matches!(err, AutostartError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/handoffd"));
    }

    #[test]
    fn test_start_passes_pending_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("pending.txt");
        let script = format!("printf %s \"${PENDING_COMMAND_VAR}\" > '{}'", out.display());
        let starter = CommandStarter::new(vec![
            OsString::from("sh"),
            OsString::from("-c"),
            OsString::from(script),
        ])
        .unwrap();

        let pid = starter.start("ls \"my file.txt\"").unwrap();
        assert!(pid > 0);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if let Ok(text) = std::fs::read_to_string(&out)
                && !text.is_empty()
            {
                assert_eq!(text, "ls \"my file.txt\"");
                break;
            }
            assert!(std::time::Instant::now() < deadline, "daemon stand-in never ran");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }

    #[test]
    fn test_pending_command_lookup() {
        let found = pending_command_from(|name| {
            assert_eq!(name, PENDING_COMMAND_VAR);
            Some("echo hi".to_string())
        });
        assert_eq!(found.as_deref(), Some("echo hi"));
        assert_eq!(pending_command_from(|_| Some("  ".to_string())), None);
        assert_eq!(pending_command_from(|_| None), None);
    }

    #[test]
    fn test_pending_command_taken_once() {
        let _ = take_pending_command();
        assert_eq!(take_pending_command(), None);
    }
}
