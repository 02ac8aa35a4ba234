//! Launch channel IPC: named Unix domain socket transport.
//!
//! The daemon registers a channel name, which resolves to a socket path, and
//! serves a small HTTP/JSON protocol on it. A client negotiates a
//! conversation for one topic, sends one execute transaction, and waits a
//! bounded time for the acknowledgement.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   GET  /topics/{topic}          ┌──────────────┐
//! │  Client  │────────────────────────────────▶│  IPC Server  │
//! │ handoff  │   POST /topics/{topic}/execute  │  (axum)      │
//! └──────────┘                                 └──────┬───────┘
//!                                                     │ queue
//!                                              ┌──────▼───────┐
//!                                              │  Dispatcher  │
//!                                              │  (one task)  │
//!                                              └──────────────┘
//! ```
//!
//! The protocol logic in [`client::Client`] only sees the [`Connector`] and
//! [`Conversation`] traits, so another local transport can be slotted in
//! without touching dispatch semantics.

use std::path::PathBuf;

use handoff_config::ChannelConfig;

pub mod client;
pub mod server;
pub mod transport;
pub mod types;

pub use client::{Client, Delivery, SendError, UnixConnector};
pub use server::{Registration, ServerState};
pub use transport::{ConnectError, Connector, Conversation, TransactError};
pub use types::*;

/// Resolve the socket path for a channel.
///
/// Uses `channel.socket_dir` when set, then `$XDG_RUNTIME_DIR`, then the
/// system temp directory.
pub fn socket_path(channel: &ChannelConfig) -> PathBuf {
    let dir = channel
        .socket_dir
        .as_deref()
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from))
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("{}.sock", channel.name))
}
