//! Daemon test helpers.
//!
//! [`TestDaemon`] runs a real [`Daemon`] inside the test's tokio runtime,
//! registered on a socket in its own temp directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use handoff_config::AppConfig;
use handoff_core::daemon::DaemonError;
use handoff_core::dispatch::LoopStatus;
use handoff_core::ipc::{Client, UnixConnector};
use handoff_core::{Daemon, ShutdownHandle};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::TestConfigBuilder;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// An in-process daemon with an owned temp directory.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic. A daemon still running at drop time
/// is asked to shut down.
pub struct TestDaemon {
    pub config: AppConfig,
    pub socket_path: PathBuf,
    shutdown: ShutdownHandle,
    task: Option<JoinHandle<Result<LoopStatus, DaemonError>>>,
    temp_dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon with default config.
    pub async fn start() -> Self {
        Self::start_with(TestConfigBuilder::new(), None).await
    }

    /// Start a daemon from `builder`, optionally with a forwarded command.
    /// The socket directory is always the daemon's own temp directory.
    pub async fn start_with(builder: TestConfigBuilder, pending: Option<&str>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = builder.socket_dir(temp_dir.path()).build();

        let daemon = Daemon::new(config.clone()).with_pending_command(pending.map(str::to_string));
        let socket_path = daemon.socket_path();
        let shutdown = daemon.shutdown_handle();
        let task = tokio::spawn(daemon.run());

        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        while !socket_path.exists() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "daemon never registered {}",
                socket_path.display()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            config,
            socket_path,
            shutdown,
            task: Some(task),
            temp_dir,
        }
    }

    pub fn connector(&self) -> UnixConnector {
        UnixConnector::new(&self.socket_path)
    }

    /// A client for this daemon, without autostart.
    pub fn client(&self) -> Client {
        let timeout = Duration::from_millis(self.config.client.timeout_ms);
        Client::new(Box::new(self.connector()), timeout)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Scratch directory that lives as long as the daemon.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Request shutdown and wait for the daemon to finish.
    pub async fn stop(self) -> LoopStatus {
        self.shutdown.request();
        self.wait().await
    }

    /// Wait for the daemon to finish on its own, e.g. after an exit request.
    pub async fn wait(mut self) -> LoopStatus {
        let task = self.task.take().expect("daemon already awaited");
        tokio::time::timeout(STOP_TIMEOUT, task)
            .await
            .expect("daemon did not stop in time")
            .expect("daemon task panicked")
            .expect("daemon failed")
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shutdown.request();
        }
    }
}
