//! Core daemon process: registration, dispatch loop, and shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use handoff_config::AppConfig;

use crate::build_info;
use crate::dispatch::{Dispatcher, HandlerTable, LoopStatus};
use crate::ipc::{self, ServerState, Topic, server};

/// How long the server may take to finish in-flight requests on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// Requests a graceful shutdown from anywhere in the daemon.
///
/// The request is sticky: late subscribers can still see it through
/// [`is_requested`](Self::is_requested).
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<ShutdownSignal>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self {
            tx,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // No subscribers just means nothing is running yet.
        let _ = self.tx.send(ShutdownSignal);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The handoff daemon.
pub struct Daemon {
    config: AppConfig,
    shutdown: ShutdownHandle,
    pending: Option<String>,
}

impl Daemon {
    /// Create a new daemon instance with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownHandle::new(),
            pending: None,
        }
    }

    /// Run `command` as an `exec` right after the channel is registered.
    pub fn with_pending_command(mut self, command: Option<String>) -> Self {
        self.pending = command;
        self
    }

    /// A handle that stops the daemon when triggered.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn socket_path(&self) -> PathBuf {
        ipc::socket_path(&self.config.channel)
    }

    /// Register the channel and serve until the exit topic, a shutdown
    /// request, or Ctrl-C.
    pub async fn run(self) -> Result<LoopStatus, DaemonError> {
        let path = self.socket_path();
        info!(
            version = %build_info::version_string(),
            channel = %self.config.channel.name,
            "handoff daemon starting"
        );

        let registration =
            server::register(&path).map_err(|source| DaemonError::Register { path, source })?;

        let (queue_tx, queue_rx) = mpsc::channel(self.config.daemon.queue_depth);
        let dispatcher = Dispatcher::new(
            HandlerTable::standard(&self.config.daemon),
            self.shutdown.clone(),
            queue_rx,
        );

        // A command forwarded by the client that started us goes first.
        if let Some(command) = &self.pending {
            info!("running forwarded command");
            dispatcher.dispatch(Topic::Exec.as_str(), command.as_bytes());
        }

        let state = Arc::new(ServerState {
            service: self.config.channel.name.clone(),
            queue: queue_tx,
        });
        let mut server = tokio::spawn(registration.serve(state, self.shutdown.subscribe()));

        let status = tokio::select! {
            status = dispatcher.run() => status,
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, initiating graceful shutdown");
                LoopStatus::Interrupted
            }
        };

        self.shutdown.request();
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "IPC server error"),
            Ok(Err(e)) => warn!(error = %e, "IPC server task failed"),
            Err(_) => {
                warn!("IPC server did not stop in time");
                server.abort();
            }
        }

        info!("Exit");
        Ok(status)
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to register channel at {}: {source}", .path.display())]
    Register {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.channel.name = "daemon-unit".to_string();
        config.channel.socket_dir = Some(dir.display().to_string());
        config
    }

    #[test]
    fn test_shutdown_handle_is_sticky() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_requested());

        // Requesting with nobody subscribed must not panic.
        handle.request();
        assert!(handle.is_requested());
        assert!(handle.clone().is_requested());
    }

    #[test]
    fn test_daemon_socket_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let daemon = Daemon::new(config_in(dir.path()));
        assert_eq!(daemon.socket_path(), dir.path().join("daemon-unit.sock"));
        assert_eq!(daemon.config().daemon.queue_depth, 16);
    }

    #[tokio::test]
    async fn test_run_until_shutdown_removes_socket() {
        let dir = tempfile::TempDir::new().unwrap();
        let daemon = Daemon::new(config_in(dir.path()));
        let socket = daemon.socket_path();
        let handle = daemon.shutdown_handle();

        let task = tokio::spawn(daemon.run());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !socket.exists() {
            assert!(std::time::Instant::now() < deadline, "daemon never registered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        handle.request();
        let status = task.await.unwrap().unwrap();
        assert_eq!(status, LoopStatus::Exited);
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_register_failure_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let daemon = Daemon::new(config_in(&blocker));
        let err = daemon.run().await.unwrap_err();
        assert!(matches!(err, DaemonError::Register { .. }));
        assert!(err.to_string().contains("failed to register channel"));
    }
}
