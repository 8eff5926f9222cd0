//! Admission policy for CONNECT tunnels
//!
//! Holds the immutable allowlist index and the admission decision made once per
//! tunnel request. Entries are either a bare hostname (any port) or an exact
//! `host:port` pair; matching is a literal string comparison.

pub mod allowlist;
pub mod decision;
pub mod hostport;

pub use allowlist::{AllowlistIndex, PolicyError};
pub use decision::{AdmissionPolicy, Decision, Mode, ParseModeError};
pub use hostport::split_host_port;
