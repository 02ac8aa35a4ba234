#![deny(unsafe_code)]

//! Shared test utilities for the handoff workspace.
//!
//! Provides a config builder, an in-process daemon on a temporary socket,
//! and tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! handoff-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod log_capture;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use daemon::TestDaemon;
pub use log_capture::{CapturedEvent, LogCapture};
