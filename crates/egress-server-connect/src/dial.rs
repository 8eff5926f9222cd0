//! Outbound connection to the tunnel destination

use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DialError {
    #[error("dial tcp {destination}: i/o timeout after {timeout:?}")]
    Timeout {
        destination: String,
        timeout: Duration,
    },

    #[error("dial tcp {destination}: {source}")]
    Connect {
        destination: String,
        #[source]
        source: io::Error,
    },
}

/// Resolve and connect to `destination`, bounded by `timeout`
pub async fn dial(destination: &str, timeout: Duration) -> Result<TcpStream, DialError> {
    debug!("Dialing {} (timeout {:?})", destination, timeout);

    let stream = connect_within(destination, timeout, TcpStream::connect(destination)).await?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", destination, e);
    }
    Ok(stream)
}

async fn connect_within<S, F>(
    destination: &str,
    timeout: Duration,
    connect: F,
) -> Result<S, DialError>
where
    F: Future<Output = io::Result<S>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(DialError::Connect {
            destination: destination.to_string(),
            source,
        }),
        Err(_) => Err(DialError::Timeout {
            destination: destination.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = dial(&addr.to_string(), DEFAULT_DIAL_TIMEOUT).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let err = dial(&addr.to_string(), DEFAULT_DIAL_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Connect { .. }));
        assert!(err.to_string().contains(&addr.to_string()));
    }

    #[tokio::test]
    async fn test_stalled_connect_times_out() {
        let timeout = Duration::from_millis(20);
        let result = connect_within::<TcpStream, _>(
            "stalled.invalid:443",
            timeout,
            std::future::pending(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            &err,
            DialError::Timeout { destination, timeout: t }
                if destination == "stalled.invalid:443" && *t == timeout
        ));
        assert!(err.to_string().contains("i/o timeout"));
    }

    #[tokio::test]
    async fn test_dial_invalid_address() {
        let err = dial("no-port-here", DEFAULT_DIAL_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Connect { .. }));
        assert!(!err.to_string().is_empty());
    }
}
