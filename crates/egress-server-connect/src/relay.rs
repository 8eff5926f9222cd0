//! Bidirectional byte relay between a detached client and its destination
//!
//! Two tasks, one per direction. When either direction ends (EOF, error, or
//! the peer going away) it shuts down the stream it was writing to and cancels
//! the other direction, so neither task can outlive its partner.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::InspectReader;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Bytes read from each side and forwarded to the other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_destination: u64,
    pub destination_to_client: u64,
}

/// Copy bytes both ways until either side closes; returns once both
/// directions have stopped
pub async fn relay<C, D>(client: C, destination: D) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    D: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (destination_read, destination_write) = tokio::io::split(destination);
    let closed = CancellationToken::new();

    let client_to_destination = tokio::spawn(pipe(
        "client->destination",
        client_read,
        destination_write,
        closed.clone(),
    ));
    let destination_to_client = tokio::spawn(pipe(
        "destination->client",
        destination_read,
        client_write,
        closed,
    ));

    let (upstream, downstream) = tokio::join!(client_to_destination, destination_to_client);

    RelayStats {
        client_to_destination: upstream.unwrap_or_default(),
        destination_to_client: downstream.unwrap_or_default(),
    }
}

async fn pipe<R, W>(
    direction: &'static str,
    reader: R,
    mut writer: W,
    closed: CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut copied = 0u64;

    {
        let mut reader = InspectReader::new(reader, |chunk: &[u8]| {
            copied += chunk.len() as u64;
        });

        tokio::select! {
            result = tokio::io::copy(&mut reader, &mut writer) => {
                if let Err(e) = result {
                    trace!("{} ended: {}", direction, e);
                }
            }
            _ = closed.cancelled() => {
                trace!("{} stopped by peer direction", direction);
            }
        }
    }

    let _ = writer.shutdown().await;
    closed.cancel();

    trace!("{} finished after {} bytes", direction, copied);
    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (mut client, client_side) = duplex(64);
        let (destination_side, mut destination) = duplex(64);

        let handle = tokio::spawn(relay(client_side, destination_side));

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        destination.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        destination.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client);
        let stats = handle.await.unwrap();
        assert_eq!(stats.client_to_destination, 4);
        assert_eq!(stats.destination_to_client, 5);

        // The destination observes end-of-stream once the client is gone
        let mut rest = Vec::new();
        destination.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_destination_close_ends_client_side() {
        let (mut client, client_side) = duplex(64);
        let (destination_side, destination) = duplex(64);

        let handle = tokio::spawn(relay(client_side, destination_side));
        drop(destination);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let stats = handle.await.unwrap();
        assert_eq!(stats, RelayStats::default());
    }

    #[tokio::test]
    async fn test_large_payload_in_order() {
        let (mut client, client_side) = duplex(1024);
        let (destination_side, mut destination) = duplex(1024);
        let handle = tokio::spawn(relay(client_side, destination_side));

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            client
        });

        let mut received = vec![0u8; expected.len()];
        destination.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);

        drop(writer.await.unwrap());
        let stats = handle.await.unwrap();
        assert_eq!(stats.client_to_destination, expected.len() as u64);
    }
}
