//! The `exit` handler.

use tracing::info;

use super::{DispatchContext, Handler, HandlerError};
use crate::ipc::Topic;

/// Stops the dispatch loop. The payload is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitHandler;

impl Handler for ExitHandler {
    fn topic(&self) -> Topic {
        Topic::Exit
    }

    fn handle(&self, _payload: &[u8], ctx: &DispatchContext) -> Result<(), HandlerError> {
        info!("shutdown requested");
        ctx.request_shutdown();
        Ok(())
    }
}
