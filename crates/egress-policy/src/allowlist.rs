//! Immutable allowlist index
//!
//! Entries are stored twice: every entry in the exact-match set, and entries
//! without a port additionally in the bare-host set. Lookups never mutate and
//! never consult anything but these two sets.

use crate::hostport::split_host_port;
use std::collections::HashSet;
use thiserror::Error;
use tracing::trace;

/// Allowlist construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Allowlist is empty")]
    EmptyAllowlist,

    #[error("Malformed allowlist entry at position {index}: {entry:?}")]
    MalformedEntry { index: usize, entry: String },
}

/// Lookup structure answering "may this destination be tunneled?"
#[derive(Debug, Clone)]
pub struct AllowlistIndex {
    /// Deduplicated entries in input order
    entries: Vec<String>,
    /// Every entry, for exact `host:port` matches
    exact: HashSet<String>,
    /// Entries without a port, matched against the destination's host
    hosts: HashSet<String>,
}

impl AllowlistIndex {
    /// Build the index from an already-parsed entry list.
    ///
    /// Duplicates are dropped (first occurrence wins). An empty list, or an
    /// entry that is empty or contains whitespace/control characters, is
    /// rejected.
    pub fn build<I, S>(entries: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut exact = HashSet::new();
        let mut hosts = HashSet::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let entry = entry.into();
            if entry.is_empty() || entry.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(PolicyError::MalformedEntry { index, entry });
            }

            if !exact.insert(entry.clone()) {
                trace!("Skipping duplicate allowlist entry {}", entry);
                continue;
            }
            if split_host_port(&entry).is_none() {
                hosts.insert(entry.clone());
            }
            ordered.push(entry);
        }

        if ordered.is_empty() {
            return Err(PolicyError::EmptyAllowlist);
        }

        Ok(Self {
            entries: ordered,
            exact,
            hosts,
        })
    }

    /// Check whether a `host:port` destination is admitted
    ///
    /// Destinations without a separable host and port are never admitted.
    /// Otherwise true iff the exact string is an entry, or the destination's
    /// host is a bare-host entry.
    pub fn is_admitted(&self, destination: &str) -> bool {
        let Some((host, _port)) = split_host_port(destination) else {
            return false;
        };

        self.exact.contains(destination) || self.hosts.contains(host)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
