//! Daemon log line format.
//!
//! [`StampedFormat`] renders each `tracing` event as one line:
//!
//! ```text
//! 2025/03/14-09:26:53: channel registered path=/run/user/1000/handoff.sock
//! 2025/03/14-09:26:58-48213: notepad /mnt/c/Users/me/todo.txt
//! ```
//!
//! Spawn records are events with target [`SPAWN_TARGET`]; their `pid` field
//! is appended to the timestamp. Every other field, including a `pid` on any
//! other event, is appended as `key=value`.

use std::fmt::{self, Write as _};

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// `strftime` pattern for the leading timestamp, in local time.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d-%H:%M:%S";

/// Target of the one event logged per spawned command.
pub const SPAWN_TARGET: &str = "handoff_core::spawn";

/// The fields of one event, split into message, spawn pid, and the rest.
#[derive(Debug, Default, Clone)]
pub struct EventFields {
    pub message: String,
    pub pid: Option<u64>,
    pub extra: Vec<(String, String)>,
}

impl EventFields {
    /// Collect the fields of `event`.
    pub fn from_event(event: &Event<'_>) -> Self {
        let mut recorder = Recorder {
            fields: Self::default(),
            spawn: event.metadata().target() == SPAWN_TARGET,
        };
        event.record(&mut recorder);
        recorder.fields
    }

    /// Look up a non-message field by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Message followed by ` key=value` pairs.
    pub fn render(&self) -> String {
        let mut line = self.message.clone();
        for (key, value) in &self.extra {
            if !line.is_empty() {
                line.push(' ');
            }
            let _ = write!(line, "{key}={value}");
        }
        line
    }

    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.extra.push((field.name().to_string(), value));
        }
    }
}

struct Recorder {
    fields: EventFields,
    spawn: bool,
}

impl Recorder {
    fn is_spawn_pid(&self, field: &Field) -> bool {
        self.spawn && field.name() == "pid"
    }
}

impl Visit for Recorder {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if self.is_spawn_pid(field) {
            self.fields.pid = Some(value);
        } else {
            self.fields.push(field, value.to_string());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        match u64::try_from(value) {
            Ok(pid) if self.is_spawn_pid(field) => self.fields.pid = Some(pid),
            _ => self.fields.push(field, value.to_string()),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields.push(field, format!("{value:?}"));
    }
}

/// `tracing-subscriber` event formatter producing the daemon's log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StampedFormat;

impl<S, N> FormatEvent<S, N> for StampedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let fields = EventFields::from_event(event);
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        match fields.pid {
            Some(pid) => write!(writer, "{stamp}-{pid}: ")?,
            None => write!(writer, "{stamp}: ")?,
        }
        writeln!(writer, "{}", fields.render())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(emit: impl FnOnce()) -> Vec<String> {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(StampedFormat)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, emit);

        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Split `"<stamp>: rest"` and check the stamp's shape.
    fn strip_stamp(line: &str) -> &str {
        let (stamp, rest) = line.split_at(19);
        assert!(
            chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok(),
            "bad timestamp in {line:?}"
        );
        rest
    }

    #[test]
    fn test_diagnostic_line() {
        let lines = capture(|| tracing::warn!("null command ignored"));
        assert_eq!(lines.len(), 1);
        assert_eq!(strip_stamp(&lines[0]), ": null command ignored");
    }

    #[test]
    fn test_spawn_line_carries_pid() {
        let lines = capture(|| {
            tracing::info!(target: SPAWN_TARGET, pid = 4321u32, "ls \"my file.txt\"")
        });
        assert_eq!(strip_stamp(&lines[0]), "-4321: ls \"my file.txt\"");
    }

    #[test]
    fn test_pid_outside_spawn_target_is_plain_field() {
        let lines = capture(|| tracing::info!(pid = 4242u32, "started daemon"));
        assert_eq!(strip_stamp(&lines[0]), ": started daemon pid=4242");
    }

    #[test]
    fn test_extra_fields_are_appended() {
        let lines = capture(|| {
            let path = std::path::Path::new("/tmp/handoff.sock");
            tracing::info!(path = %path.display(), attempt = 2, "channel registered");
        });
        assert_eq!(
            strip_stamp(&lines[0]),
            ": channel registered path=/tmp/handoff.sock attempt=2"
        );
    }

    #[test]
    fn test_event_fields_lookup() {
        let fields = EventFields {
            message: "spawn failed".to_string(),
            pid: None,
            extra: vec![("error".to_string(), "not found".to_string())],
        };
        assert_eq!(fields.get("error"), Some("not found"));
        assert_eq!(fields.get("pid"), None);
        assert_eq!(fields.render(), "spawn failed error=not found");
    }
}
