//! CONNECT proxy listener
//!
//! Owns the listening socket and spawns one `TunnelSession` per accepted
//! connection, so a stalled session never holds up the accept loop.

use crate::dial::DEFAULT_DIAL_TIMEOUT;
use crate::session::{SessionOutcome, TunnelSession};
use crate::transport::HttpConnection;
use egress_events::EventLogger;
use egress_policy::AdmissionPolicy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum ConnectServerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try using a different address or port")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ConnectServerConfig {
    pub bind_addr: SocketAddr,
    /// Upper bound for connecting to a destination
    pub dial_timeout: Duration,
}

impl Default for ConnectServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9091)),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

/// Session ID generator for log correlation
#[derive(Clone)]
pub struct SessionIdGenerator {
    next_session_id: Arc<AtomicU64>,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self {
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn generate(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ConnectServer {
    listener: TcpListener,
    config: ConnectServerConfig,
    policy: Arc<AdmissionPolicy>,
    logger: EventLogger,
    session_ids: SessionIdGenerator,
}

impl ConnectServer {
    /// Bind the listening socket
    ///
    /// `AddrInUse` is retried a couple of times to ride out TIME_WAIT; any
    /// other failure is returned immediately.
    pub async fn bind(
        config: ConnectServerConfig,
        policy: Arc<AdmissionPolicy>,
        logger: EventLogger,
    ) -> Result<Self, ConnectServerError> {
        let listener = Self::bind_with_retry(config.bind_addr).await?;
        Ok(Self {
            listener,
            config,
            policy,
            logger,
            session_ids: SessionIdGenerator::new(),
        })
    }

    async fn bind_with_retry(bind_addr: SocketAddr) -> Result<TcpListener, ConnectServerError> {
        let bind_error = |reason: String| ConnectServerError::BindError {
            address: bind_addr.ip().to_string(),
            port: bind_addr.port(),
            reason,
        };

        for attempt in 1..=3 {
            match TcpListener::bind(bind_addr).await {
                Ok(listener) => {
                    if attempt > 1 {
                        info!(
                            "Successfully bound to {} on attempt {}/3",
                            bind_addr, attempt
                        );
                    }
                    return Ok(listener);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && attempt < 3 => {
                    warn!(
                        "Port {} is in use (attempt {}/3, may be in TIME_WAIT state), retrying in 1 second...",
                        bind_addr.port(),
                        attempt
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(bind_error(e.to_string())),
            }
        }

        Err(bind_error("Address in use after 3 retry attempts".to_string()))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ConnectServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Announce the configuration and accept connections until the task is dropped
    pub async fn run(self) -> Result<(), ConnectServerError> {
        let addr = self.listener.local_addr()?;
        let allowlist = self.policy.allowlist();

        info!(
            "CONNECT proxy listening on {} ({} mode, {} allowlist entries)",
            addr,
            self.policy.mode(),
            allowlist.len()
        );
        self.logger.proxy_starting(addr, self.policy.mode().as_str(), allowlist.len());
        for entry in allowlist.entries() {
            self.logger.allowlist_entry(entry);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let session_id = self.session_ids.generate();
                    debug!("New connection {} from {}", session_id, peer_addr);

                    let session = TunnelSession::new(
                        HttpConnection::new(stream),
                        self.policy.clone(),
                        self.logger.clone(),
                        self.config.dial_timeout,
                    );
                    let span = info_span!("session", id = session_id, peer = %peer_addr);

                    tokio::spawn(
                        async move {
                            let outcome = session.run().await;
                            match outcome {
                                SessionOutcome::Closed(stats) => debug!(
                                    "Session ended: {} bytes up, {} bytes down",
                                    stats.client_to_destination, stats.destination_to_client
                                ),
                                other => debug!("Session ended: {:?}", other),
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
