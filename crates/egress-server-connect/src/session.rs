//! Tunnel session state machine
//!
//! One session per accepted client connection:
//!
//! ```text
//! Received -> Admitted -> Dialing -> Established -> TunnelEstablished -> Relaying -> Closed
//!     |           |           |            |
//!     |           |           |            +-> HijackUnsupported (500)
//!     |           |           +-> DialFailed (502)
//!     |           +-> Blocked (403) / MethodRejected (405)
//!     +-> BadRequest (400)
//! ```
//!
//! Every CONNECT request produces exactly one `connection_attempt` record
//! before anything is dialed. All sockets are owned by the session and are
//! released when it returns, whichever path it took.

use crate::dial::dial;
use crate::relay::{relay, RelayStats};
use crate::request::{RequestError, CONNECTION_ESTABLISHED};
use crate::transport::{ClientTransport, Hijacked};
use egress_events::{Action, EventLogger};
use egress_policy::{AdmissionPolicy, Decision};
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Terminal state reached by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No parsable request head arrived
    BadRequest,
    MethodRejected,
    Blocked,
    DialFailed,
    /// The client connection could not be detached from the HTTP layer
    HijackUnsupported,
    Closed(RelayStats),
}

pub struct TunnelSession<C> {
    client: C,
    policy: Arc<AdmissionPolicy>,
    logger: EventLogger,
    dial_timeout: Duration,
}

impl<C: ClientTransport> TunnelSession<C> {
    pub fn new(
        client: C,
        policy: Arc<AdmissionPolicy>,
        logger: EventLogger,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            client,
            policy,
            logger,
            dial_timeout,
        }
    }

    /// Drive the session to a terminal state
    pub async fn run(mut self) -> SessionOutcome {
        let request = match self.client.read_request().await {
            Ok(request) => request,
            Err(RequestError::Closed) => {
                debug!("Client closed before sending a request");
                return SessionOutcome::BadRequest;
            }
            Err(RequestError::Io(e)) => {
                debug!("Failed to read request: {}", e);
                return SessionOutcome::BadRequest;
            }
            Err(e) => {
                debug!("Rejecting request: {}", e);
                self.reply(StatusCode::BAD_REQUEST, "Bad Request").await;
                return SessionOutcome::BadRequest;
            }
        };

        let destination = request.target;
        let action = match self.policy.decide(&request.method, &destination) {
            Decision::MethodRejected => {
                debug!("Rejecting {} request for {}", request.method, destination);
                self.reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").await;
                return SessionOutcome::MethodRejected;
            }
            Decision::Blocked => Action::Blocked,
            Decision::Allow => Action::Allowed,
            Decision::AllowDiscovery => Action::AllowedDiscovery,
        };

        self.logger.connection_attempt(&destination, action);

        if action == Action::Blocked {
            warn!(
                "Blocked connection attempt to {} (not in allowlist)",
                destination
            );
            self.reply(StatusCode::FORBIDDEN, "Forbidden: Destination not allowed").await;
            return SessionOutcome::Blocked;
        }

        let upstream = match dial(&destination, self.dial_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to connect to {}: {}", destination, e);
                self.logger.connection_failed(&destination, e.to_string());
                self.reply(StatusCode::BAD_GATEWAY, "Bad Gateway").await;
                return SessionOutcome::DialFailed;
            }
        };

        let hijacked = match self.client.hijack() {
            Ok(hijacked) => hijacked,
            Err(e) => {
                error!(
                    "Cannot take over client connection for {}: {}",
                    destination, e
                );
                drop(upstream);
                self.reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").await;
                return SessionOutcome::HijackUnsupported;
            }
        };

        info!("Tunnel established to {}", destination);
        let stats = tunnel(hijacked, upstream).await;
        debug!(
            "Tunnel to {} closed: {} bytes to destination, {} bytes to client",
            destination, stats.client_to_destination, stats.destination_to_client
        );

        self.logger.connection_closed(&destination);
        SessionOutcome::Closed(stats)
    }

    async fn reply(&mut self, status: StatusCode, body: &str) {
        if let Err(e) = self.client.respond(status, body).await {
            debug!("Failed to send {} response: {}", status.as_u16(), e);
        }
    }
}

/// Acknowledge the tunnel on the raw stream, flush pipelined client bytes to
/// the destination, then relay until both directions end
async fn tunnel<Io>(hijacked: Hijacked<Io>, mut upstream: TcpStream) -> RelayStats
where
    Io: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let Hijacked { mut io, buffered } = hijacked;

    let handshake = async {
        io.write_all(CONNECTION_ESTABLISHED).await?;
        io.flush().await?;
        if !buffered.is_empty() {
            upstream.write_all(&buffered).await?;
        }
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(e) = handshake {
        debug!("Tunnel handshake failed: {}", e);
        return RelayStats::default();
    }

    let mut stats = relay(io, upstream).await;
    stats.client_to_destination += buffered.len() as u64;
    stats
}
