//! Structured event log for the CONNECT proxy
//!
//! Every state transition of a tunnel session becomes one JSON object on one
//! line. The schema is consumed by `logs-to-config`, so field names and enum
//! spellings are part of the contract.

mod logger;
mod record;

pub use logger::EventLogger;
#[cfg(any(test, feature = "test-support"))]
pub use logger::MemorySink;
pub use record::{Action, Event, Level, LogRecord};
