#![deny(unsafe_code)]

//! handoff core runtime.
//!
//! A short-lived `handoff` client hands one command line to a long-running
//! `handoffd` daemon over a named local channel; the daemon spawns it and
//! logs the result. This crate holds everything both binaries share: the
//! command-line codec, the channel protocol, and the daemon's dispatch loop.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future - the standard return type for async
/// trait methods that require dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits produces opaque return types that are **not**
/// object-safe. Traits consumed via `Box<dyn Trait>` must return a concrete
/// `Pin<Box<dyn Future>>` instead. This alias keeps those signatures readable.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Starting a daemon on demand and the pending-command side channel.
pub mod autostart;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Lossless argument-vector encoding and command-line splitting.
pub mod cmdline;
/// Daemon runtime: registration, dispatch loop, shutdown.
pub mod daemon;
/// Handler table and the serialized dispatch loop.
pub mod dispatch;
/// Named-channel client/server protocol.
pub mod ipc;
/// Daemon log line format.
pub mod logging;
/// Translation of bracketed `[path]` arguments.
pub mod paths;

pub use autostart::{CommandStarter, DaemonStarter};
pub use cmdline::{ArgVector, encode_payload, escape_args, split};
pub use daemon::{Daemon, ShutdownHandle};
pub use dispatch::LoopStatus;
pub use ipc::{Client, Delivery, Topic, UnixConnector};
pub use logging::StampedFormat;
