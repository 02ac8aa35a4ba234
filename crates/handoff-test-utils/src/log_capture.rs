//! In-memory capture of `tracing` events.
//!
//! A [`LogCapture`] layer records every event it sees, split into the same
//! fields the daemon's log format uses, so tests can assert on log lines
//! such as the pid-stamped spawn record.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use handoff_core::logging::EventFields;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// A single captured event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub fields: EventFields,
}

impl CapturedEvent {
    pub fn message(&self) -> &str {
        &self.fields.message
    }

    pub fn pid(&self) -> Option<u64> {
        self.fields.pid
    }
}

/// A `tracing` layer that keeps every event in a shared buffer.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install this layer as the thread's default subscriber until the
    /// guard is dropped. Events from tasks on a current-thread runtime are
    /// captured too.
    pub fn set_default(&self) -> DefaultGuard {
        tracing_subscriber::registry()
            .with(self.clone())
            .set_default()
    }

    /// Snapshot of all captured events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.fields.message)
            .collect()
    }

    /// Spawn records, the only events whose `pid` is split out.
    pub fn spawns(&self) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.pid().is_some())
            .collect()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.events().iter().any(|e| e.message().contains(message))
    }

    /// Poll until an event containing `message` shows up.
    pub async fn wait_for(&self, message: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.contains(message) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let captured = CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            fields: EventFields::from_event(event),
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

#[cfg(test)]
mod tests {
    use handoff_core::logging::SPAWN_TARGET;

    use super::*;

    #[test]
    fn test_captures_fields() {
        let capture = LogCapture::new();
        let _guard = capture.set_default();

        tracing::info!(target: SPAWN_TARGET, pid = 77u32, "sh -c true");
        tracing::warn!("null command ignored");
        tracing::info!(daemon_pid = 78u32, "started daemon");

        let events = capture.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].pid(), Some(77));
        assert_eq!(events[0].message(), "sh -c true");
        assert_eq!(events[1].level, Level::WARN);
        assert_eq!(capture.spawns().len(), 1);
        assert!(capture.contains("null command"));
    }
}
