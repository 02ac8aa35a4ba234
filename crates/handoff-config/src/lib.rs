#![deny(unsafe_code)]

//! Configuration loading and validation for handoff.
//!
//! Loads TOML configuration files shared by the `handoff` client and the
//! `handoffd` daemon. Both processes must agree on the [`ChannelConfig`]
//! to find each other; the remaining sections are read by one side only.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Named channel shared by client and daemon.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Client-side request and autostart settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Daemon dispatch settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The named local channel both processes rendezvous on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel (service) name. The socket is `<socket_dir>/<name>.sock`.
    #[serde(default = "default_channel_name")]
    pub name: String,

    /// Directory holding the channel socket. Falls back to
    /// `$XDG_RUNTIME_DIR`, then the system temp directory.
    #[serde(default)]
    pub socket_dir: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: default_channel_name(),
            socket_dir: None,
        }
    }
}

fn default_channel_name() -> String {
    "handoff".to_string()
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// How long to wait for the daemon's acknowledgement, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Start a daemon when an `exec` request finds nobody listening.
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Encoded command line used to start the daemon. Overridden by the
    /// `HANDOFF_DAEMON` environment variable.
    #[serde(default)]
    pub daemon_command: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            autostart: default_autostart(),
            daemon_command: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_autostart() -> bool {
    true
}

/// Configuration for the launch daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Transactions that may wait for the dispatch loop before new
    /// requests are answered with "busy".
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Maximum number of arguments accepted in one command.
    #[serde(default = "default_max_args")]
    pub max_args: usize,

    /// Where foreign drive letters are mounted (`C:\x` becomes
    /// `<drive_root>/c/x`).
    #[serde(default = "default_drive_root")]
    pub drive_root: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            max_args: default_max_args(),
            drive_root: default_drive_root(),
        }
    }
}

fn default_queue_depth() -> usize {
    16
}

fn default_max_args() -> usize {
    1023
}

fn default_drive_root() -> String {
    "/mnt".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        debug!(path = %path.display(), "loaded config file");
        Self::parse(&content)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path).await {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.name.is_empty() {
            return Err(ConfigError::Validation(
                "channel.name must not be empty".to_string(),
            ));
        }
        if self.channel.name.contains('/') || self.channel.name.contains('\0') {
            return Err(ConfigError::Validation(format!(
                "channel.name must be a plain name, got {:?}",
                self.channel.name
            )));
        }
        if let Some(dir) = &self.channel.socket_dir
            && dir.is_empty()
        {
            return Err(ConfigError::Validation(
                "channel.socket_dir must not be empty when set".to_string(),
            ));
        }

        if self.client.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "client.timeout_ms must be non-zero".to_string(),
            ));
        }
        if let Some(cmd) = &self.client.daemon_command
            && cmd.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "client.daemon_command must not be blank when set".to_string(),
            ));
        }

        if self.daemon.queue_depth == 0 {
            return Err(ConfigError::Validation(
                "daemon.queue_depth must be at least 1".to_string(),
            ));
        }
        if self.daemon.max_args == 0 {
            return Err(ConfigError::Validation(
                "daemon.max_args must be at least 1".to_string(),
            ));
        }
        if !self.daemon.drive_root.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "daemon.drive_root must be an absolute path, got {:?}",
                self.daemon.drive_root
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}
