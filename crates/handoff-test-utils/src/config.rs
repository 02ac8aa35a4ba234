//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use handoff_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_dir(tmp.path())
///     .timeout_ms(500)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    /// Defaults, except that tests never start real daemon processes.
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.client.autostart = false;
        Self { config }
    }

    pub fn channel_name(mut self, name: &str) -> Self {
        self.config.channel.name = name.to_string();
        self
    }

    pub fn socket_dir(mut self, dir: &Path) -> Self {
        self.config.channel.socket_dir = Some(dir.display().to_string());
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.client.timeout_ms = ms;
        self
    }

    pub fn autostart(mut self, enabled: bool) -> Self {
        self.config.client.autostart = enabled;
        self
    }

    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.config.daemon.queue_depth = depth;
        self
    }

    pub fn max_args(mut self, n: usize) -> Self {
        self.config.daemon.max_args = n;
        self
    }

    pub fn drive_root(mut self, root: &str) -> Self {
        self.config.daemon.drive_root = root.to_string();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
