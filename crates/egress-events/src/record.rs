//! Event record schema

use serde::{Deserialize, Serialize};

/// Record severity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    ProxyStarting,
    AllowlistEntry,
    ConnectionAttempt,
    ConnectionFailed,
    ConnectionClosed,
    InitializationFailed,
    ServerFailed,
}

/// Admission result carried by `connection_attempt` records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allowed,
    Blocked,
    AllowedDiscovery,
}

/// One line of the event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// RFC3339 UTC, stamped by the logger when the record is written
    #[serde(default)]
    pub timestamp: String,
    pub level: Level,
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogRecord {
    pub fn new(level: Level, event: Event) -> Self {
        Self {
            timestamp: String::new(),
            level,
            event,
            destination: None,
            action: None,
            error: None,
            message: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let record = LogRecord::new(Level::Info, Event::ConnectionClosed)
            .with_destination("example.com:443");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp":"","level":"INFO","event":"connection_closed","destination":"example.com:443"}"#
        );
    }

    #[test]
    fn test_enum_spellings() {
        assert_eq!(
            serde_json::to_string(&Level::Warning).unwrap(),
            r#""WARNING""#
        );
        assert_eq!(serde_json::to_string(&Level::Debug).unwrap(), r#""DEBUG""#);
        assert_eq!(
            serde_json::to_string(&Action::AllowedDiscovery).unwrap(),
            r#""allowed_discovery""#
        );
        assert_eq!(
            serde_json::to_string(&Event::InitializationFailed).unwrap(),
            r#""initialization_failed""#
        );
        assert_eq!(
            serde_json::to_string(&Event::AllowlistEntry).unwrap(),
            r#""allowlist_entry""#
        );
    }

    #[test]
    fn test_parse_record_without_optional_fields() {
        let line = r#"{"timestamp":"2025-01-01T00:00:00Z","level":"ERROR","event":"server_failed"}"#;
        let record: LogRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.level, Level::Error);
        assert_eq!(record.event, Event::ServerFailed);
        assert!(record.destination.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
    }
}
