//! Line-oriented JSON event logger

use crate::record::{Action, Event, Level, LogRecord};
use chrono::{SecondsFormat, Utc};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

type Sink = Box<dyn Write + Send>;

/// Append-only event emitter
///
/// Records are written synchronously by the caller; the sink is shared by all
/// clones and guarded by a mutex so concurrent sessions never interleave
/// within a line.
#[derive(Clone)]
pub struct EventLogger {
    sink: Arc<Mutex<Sink>>,
    min_level: Level,
}

impl EventLogger {
    /// Log to an arbitrary writer, dropping DEBUG records
    pub fn new<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
            min_level: Level::Info,
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Emit DEBUG records too
    pub fn with_debug(self, enabled: bool) -> Self {
        if enabled {
            self.with_min_level(Level::Debug)
        } else {
            self.with_min_level(Level::Info)
        }
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    /// Stamp and write one record
    ///
    /// Failures are reported through `tracing` and the record is dropped.
    pub fn log(&self, mut record: LogRecord) {
        if record.level < self.min_level {
            return;
        }

        record.timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize {:?} event record: {}", record.event, e);
                return;
            }
        };
        line.push(b'\n');

        let mut sink = self.lock_sink();
        if let Err(e) = sink.write_all(&line).and_then(|_| sink.flush()) {
            warn!("Failed to write {:?} event record: {}", record.event, e);
        }
    }

    fn lock_sink(&self) -> MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn info(&self, event: Event, message: impl Into<String>) {
        self.log(LogRecord::new(Level::Info, event).with_message(message));
    }

    pub fn error(&self, event: Event, message: impl Into<String>, error: impl Into<String>) {
        self.log(
            LogRecord::new(Level::Error, event)
                .with_message(message)
                .with_error(error),
        );
    }

    pub fn proxy_starting(&self, listen: impl std::fmt::Display, mode: &str, entries: usize) {
        self.info(
            Event::ProxyStarting,
            format!(
                "Proxy starting on {} (mode={}, allowlist_entries={})",
                listen, mode, entries
            ),
        );
    }

    pub fn allowlist_entry(&self, entry: &str) {
        self.log(LogRecord::new(Level::Debug, Event::AllowlistEntry).with_message(entry));
    }

    /// Blocked attempts are WARNING, admitted ones INFO
    pub fn connection_attempt(&self, destination: &str, action: Action) {
        let level = match action {
            Action::Blocked => Level::Warning,
            Action::Allowed | Action::AllowedDiscovery => Level::Info,
        };
        self.log(
            LogRecord::new(level, Event::ConnectionAttempt)
                .with_destination(destination)
                .with_action(action),
        );
    }

    pub fn connection_failed(&self, destination: &str, error: impl Into<String>) {
        self.log(
            LogRecord::new(Level::Error, Event::ConnectionFailed)
                .with_destination(destination)
                .with_error(error),
        );
    }

    pub fn connection_closed(&self, destination: &str) {
        self.log(
            LogRecord::new(Level::Info, Event::ConnectionClosed).with_destination(destination),
        );
    }

    pub fn initialization_failed(&self, error: impl Into<String>) {
        self.error(
            Event::InitializationFailed,
            "Failed to initialize proxy",
            error,
        );
    }

    pub fn server_failed(&self, error: impl Into<String>) {
        self.error(Event::ServerFailed, "Proxy server failed", error);
    }
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

/// In-memory sink whose clones share one buffer
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Parse every complete line written so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn capture() -> (EventLogger, MemorySink) {
        let sink = MemorySink::new();
        (EventLogger::new(sink.clone()), sink)
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_info_record() {
        let (logger, sink) = capture();
        logger.info(Event::ProxyStarting, "test message");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Info);
        assert_eq!(records[0].event, Event::ProxyStarting);
        assert_eq!(records[0].message.as_deref(), Some("test message"));
    }

    #[test]
    fn test_timestamp_is_rfc3339_utc() {
        let (logger, sink) = capture();
        logger.connection_closed("example.com:443");

        let records = sink.records();
        let record = &records[0];
        assert!(record.timestamp.ends_with('Z'), "{}", record.timestamp);
        DateTime::parse_from_rfc3339(&record.timestamp).unwrap();
    }

    #[test]
    fn test_connection_attempt_fields() {
        let (logger, sink) = capture();
        logger.connection_attempt("example.com:443", Action::Allowed);
        logger.connection_attempt("evil.com:443", Action::Blocked);

        let records = sink.records();
        assert_eq!(records[0].event, Event::ConnectionAttempt);
        assert_eq!(records[0].destination.as_deref(), Some("example.com:443"));
        assert_eq!(records[0].action, Some(Action::Allowed));
        assert_eq!(records[0].level, Level::Info);
        assert_eq!(records[1].action, Some(Action::Blocked));
        assert_eq!(records[1].level, Level::Warning);
    }

    #[test]
    fn test_one_line_per_record() {
        let (logger, sink) = capture();
        logger.connection_attempt("a.com:1", Action::Allowed);
        logger.connection_failed("a.com:1", "connection refused");
        logger.server_failed("bind: address in use");

        let contents = sink.contents();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.ends_with('\n'));

        let records = sink.records();
        assert_eq!(records[1].error.as_deref(), Some("connection refused"));
        assert_eq!(records[2].event, Event::ServerFailed);
        assert_eq!(records[2].level, Level::Error);
    }

    #[test]
    fn test_debug_records_filtered_by_default() {
        let (logger, sink) = capture();
        logger.allowlist_entry("example.com");
        assert!(sink.contents().is_empty());

        let logger = logger.with_debug(true);
        logger.allowlist_entry("example.com");
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Debug);
        assert_eq!(records[0].message.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let logger = EventLogger::new(FailingSink);
        logger.connection_closed("example.com:443");
        logger.server_failed("still alive");
    }

    #[test]
    fn test_concurrent_writers_never_interleave() {
        let (logger, sink) = capture();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let destination = format!("host-{}-{}.test:443", t, i);
                        logger.connection_attempt(&destination, Action::Allowed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = sink.contents();
        assert_eq!(contents.lines().count(), 400);
        for line in contents.lines() {
            serde_json::from_str::<LogRecord>(line).unwrap();
        }
    }
}
