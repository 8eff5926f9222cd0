//! Per-request admission decision

use crate::allowlist::AllowlistIndex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Process-wide operating mode, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Only allowlisted destinations are tunneled
    #[default]
    Restricted,
    /// Every destination is tunneled; the event log records what would have been blocked
    Discovery,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Restricted => "restricted",
            Mode::Discovery => "discovery",
        }
    }

    pub fn is_discovery(&self) -> bool {
        matches!(self, Mode::Discovery)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown mode {0:?} (expected \"restricted\" or \"discovery\")")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restricted" => Ok(Mode::Restricted),
            "discovery" => Ok(Mode::Discovery),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// Terminal outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not a CONNECT request; nothing is dialed
    MethodRejected,
    /// Destination is not on the allowlist (restricted mode)
    Blocked,
    /// Destination is on the allowlist (restricted mode)
    Allow,
    /// Discovery mode; tunneled regardless of the allowlist
    AllowDiscovery,
}

impl Decision {
    /// Whether the destination should be dialed
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Allow | Decision::AllowDiscovery)
    }
}

/// Admission policy shared by every tunnel session
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    index: Arc<AllowlistIndex>,
    mode: Mode,
}

impl AdmissionPolicy {
    pub fn new(index: AllowlistIndex, mode: Mode) -> Self {
        Self {
            index: Arc::new(index),
            mode,
        }
    }

    /// Decide what to do with a request
    ///
    /// Method names are compared case-sensitively, as HTTP methods are.
    pub fn decide(&self, method: &str, destination: &str) -> Decision {
        let decision = if method != "CONNECT" {
            Decision::MethodRejected
        } else if self.mode.is_discovery() {
            Decision::AllowDiscovery
        } else if self.index.is_admitted(destination) {
            Decision::Allow
        } else {
            Decision::Blocked
        };

        trace!(
            "Admission {} {} ({} mode) -> {:?}",
            method,
            destination,
            self.mode,
            decision
        );
        decision
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn allowlist(&self) -> &AllowlistIndex {
        &self.index
    }
}
