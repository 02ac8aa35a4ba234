//! The daemon's dispatch loop and its handler table.
//!
//! Every execute transaction the server accepts is queued to a single
//! [`Dispatcher`], which runs handlers one at a time to completion. Handlers
//! therefore never run concurrently and the table needs no locking.

use std::collections::HashMap;

use handoff_config::DaemonConfig;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::cmdline::SplitError;
use crate::daemon::{ShutdownHandle, ShutdownSignal};
use crate::ipc::{Outcome, Topic};

mod exec;
mod exit;

pub use exec::{ExecHandler, LaunchRecord};
pub use exit::ExitHandler;

/// Why a handler reported failure.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("null command ignored")]
    NullCommand,

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

/// State handlers may touch while running.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    shutdown: ShutdownHandle,
}

impl DispatchContext {
    pub fn new(shutdown: ShutdownHandle) -> Self {
        Self { shutdown }
    }

    /// Ask the dispatch loop, and with it the daemon, to stop.
    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }
}

/// Processes the payload of one topic.
pub trait Handler: Send + Sync {
    /// The topic this handler answers.
    fn topic(&self) -> Topic;

    /// Handle one payload. `Ok` becomes a positive acknowledgement.
    fn handle(&self, payload: &[u8], ctx: &DispatchContext) -> Result<(), HandlerError>;
}

/// Topic name to handler, fixed once the daemon starts.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `exec` and `exit` handlers, configured from `config`.
    pub fn standard(config: &DaemonConfig) -> Self {
        let mut table = Self::new();
        table.register(Box::new(ExecHandler::from_config(config)));
        table.register(Box::new(ExitHandler));
        table
    }

    /// Register a handler, replacing any previous one for its topic.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        self.handlers.insert(handler.topic().to_string(), handler);
    }

    /// Look a handler up by exact topic name.
    pub fn get(&self, topic: &str) -> Option<&dyn Handler> {
        self.handlers.get(topic).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// One queued execute request and the slot its outcome goes to.
#[derive(Debug)]
pub struct Transaction {
    pub topic: String,
    pub payload: Vec<u8>,
    pub reply: oneshot::Sender<Outcome>,
}

impl Transaction {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> (Self, oneshot::Receiver<Outcome>) {
        let (reply, rx) = oneshot::channel();
        let txn = Self {
            topic: topic.into(),
            payload,
            reply,
        };
        (txn, rx)
    }
}

/// How the dispatch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// The exit topic, or a shutdown request, stopped the loop.
    Exited,
    /// Ctrl-C.
    Interrupted,
    /// Every queue sender went away while the loop was still running.
    QueueClosed,
}

impl LoopStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            LoopStatus::Exited | LoopStatus::Interrupted => 0,
            LoopStatus::QueueClosed => 2,
        }
    }
}

/// The single consumer of the transaction queue.
pub struct Dispatcher {
    table: HandlerTable,
    ctx: DispatchContext,
    shutdown: ShutdownHandle,
    shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    queue: mpsc::Receiver<Transaction>,
}

impl Dispatcher {
    pub fn new(table: HandlerTable, shutdown: ShutdownHandle, queue: mpsc::Receiver<Transaction>) -> Self {
        Self {
            table,
            ctx: DispatchContext::new(shutdown.clone()),
            shutdown_rx: shutdown.subscribe(),
            shutdown,
            queue,
        }
    }

    /// Run the handler for `topic` and classify the result.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Outcome {
        let Some(handler) = self.table.get(topic) else {
            debug!(topic, "no handler registered");
            return Outcome::NotProcessed;
        };
        match handler.handle(payload, &self.ctx) {
            Ok(()) => Outcome::Acknowledged,
            Err(e) => {
                debug!(topic, error = %e, "handler declined");
                Outcome::Declined
            }
        }
    }

    /// Serve queued transactions until shutdown is requested.
    pub async fn run(mut self) -> LoopStatus {
        loop {
            if self.shutdown.is_requested() {
                return LoopStatus::Exited;
            }

            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => return LoopStatus::Exited,

                next = self.queue.recv() => match next {
                    Some(txn) => {
                        let outcome = self.dispatch(&txn.topic, &txn.payload);
                        // The requester may have timed out and gone away.
                        let _ = txn.reply.send(outcome);
                    }
                    None => {
                        warn!("dispatch queue closed");
                        return LoopStatus::QueueClosed;
                    }
                },
            }
        }
    }
}
