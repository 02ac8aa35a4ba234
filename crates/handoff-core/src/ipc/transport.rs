//! Transport capability traits.
//!
//! A [`Connector`] knows how to reach the daemon's channel; a
//! [`Conversation`] is one negotiated connection for one topic. The client
//! protocol is written against these traits only.

use std::path::PathBuf;
use std::time::Duration;

use super::types::{ServiceTopic, Topic};
use crate::BoxFuture;

/// Errors while establishing a conversation.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Nobody is registered under the channel name.
    #[error("no daemon is listening on {}", .0.display())]
    NoListener(PathBuf),

    #[error("failed to establish connection: topic {0:?} was rejected")]
    Rejected(String),

    #[error("failed to connect to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The socket accepted but negotiation got no answer in time.
    #[error("failed to establish connection: no answer within {}ms", .0.as_millis())]
    NoResponse(Duration),

    #[error("failed to establish connection: {0}")]
    Protocol(String),
}

/// Errors from an execute transaction on an established conversation.
#[derive(Debug, thiserror::Error)]
pub enum TransactError {
    #[error("daemon is busy")]
    Busy,

    /// The handler ran and declined the request.
    #[error("daemon cannot handle this command")]
    NotHandled,

    #[error("daemon has no handler for topic {0}")]
    NoHandler(Topic),

    #[error("daemon did not respond within {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("transaction failed: {0}")]
    Protocol(String),
}

/// Something that can open conversations with the daemon.
pub trait Connector: Send + Sync {
    /// Negotiate a conversation for `topic`.
    fn connect(&self, topic: Topic) -> BoxFuture<'_, Result<Box<dyn Conversation>, ConnectError>>;

    /// Ask the daemon which (service, topic) pairs it supports.
    fn discover(&self) -> BoxFuture<'_, Result<Vec<ServiceTopic>, ConnectError>>;
}

/// One negotiated connection.
///
/// Implementations must release the underlying connection when dropped, so
/// teardown also happens on early returns and unwinding.
pub trait Conversation: Send {
    fn topic(&self) -> Topic;

    /// Send `payload` as a single execute transaction and wait at most
    /// `timeout` for the acknowledgement.
    fn execute<'a>(
        &'a mut self,
        payload: &'a [u8],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), TransactError>>;

    /// Tear the connection down.
    fn disconnect(self: Box<Self>) -> BoxFuture<'static, ()>;
}
