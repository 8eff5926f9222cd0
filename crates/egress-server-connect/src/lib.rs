//! HTTP CONNECT tunnel server
//!
//! Accepts client connections, admits or rejects each CONNECT request against
//! the allowlist policy, and relays raw bytes between the client and the
//! destination once the tunnel is established. Each accepted connection is
//! handled by its own `TunnelSession`.

mod dial;
mod relay;
mod request;
mod server;
mod session;
mod transport;

pub use dial::{dial, DialError, DEFAULT_DIAL_TIMEOUT};
pub use relay::{relay, RelayStats};
pub use request::{read_request_head, RequestError, RequestHead, CONNECTION_ESTABLISHED};
pub use server::{ConnectServer, ConnectServerConfig, ConnectServerError, SessionIdGenerator};
pub use session::{SessionOutcome, TunnelSession};
pub use transport::{ClientTransport, HijackError, Hijacked, HttpConnection};
