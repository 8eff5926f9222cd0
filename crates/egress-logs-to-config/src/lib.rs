//! Turn a discovery-mode event log into an allowlist
//!
//! Every `connection_attempt` record names a destination the proxy was asked
//! to reach. Collecting those, sorted and without duplicates, yields an
//! allowlist that admits exactly what was observed.

use egress_config::AllowlistDocument;
use egress_events::Event;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::BufRead;
use tracing::trace;

/// The subset of a log record this tool cares about
///
/// Kept looser than `LogRecord` so that records with an unexpected level or
/// extra fields still contribute their destination.
#[derive(Debug, Deserialize)]
struct AttemptLine {
    event: Event,
    #[serde(default)]
    destination: Option<String>,
}

/// Result of scanning a log
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collected {
    pub destinations: BTreeSet<String>,
    pub lines: usize,
    pub skipped: usize,
}

impl Collected {
    pub fn into_document(self) -> AllowlistDocument {
        AllowlistDocument::new(self.destinations.into_iter().collect())
    }
}

/// Scan JSON lines, keeping the destination of every connection attempt
///
/// Lines that are not JSON records (including ones that are not UTF-8) are
/// skipped. Read errors are returned.
pub fn collect_destinations<R: BufRead>(reader: R) -> std::io::Result<Collected> {
    let mut collected = Collected::default();

    for line in reader.split(b'\n') {
        let line = line?;
        collected.lines += 1;

        let line = line.strip_suffix(b"\r").unwrap_or(&line);
        let record: AttemptLine = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(e) => {
                trace!("Skipping line {}: {}", collected.lines, e);
                collected.skipped += 1;
                continue;
            }
        };

        if record.event != Event::ConnectionAttempt {
            continue;
        }
        if let Some(destination) = record.destination.filter(|d| !d.is_empty()) {
            collected.destinations.insert(destination);
        }
    }

    Ok(collected)
}
