//! Client-side transport abstraction
//!
//! A session talks to its client through the HTTP framing layer until the
//! tunnel is admitted and dialed, then asks the transport to give up the raw
//! stream (`hijack`). Transports that cannot hand over their stream report
//! `HijackError` instead of pretending to succeed.

use crate::request::{format_response, read_request_head, RequestError, RequestHead};
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

#[derive(Debug, Error)]
pub enum HijackError {
    #[error("Connection was already detached from the HTTP layer")]
    AlreadyDetached,

    #[error("Transport does not support detaching: {0}")]
    Unsupported(String),
}

/// A client stream released from HTTP framing
pub struct Hijacked<Io> {
    pub io: Io,
    /// Bytes the client sent after the request head that were already read
    /// into the framing layer's buffer; they belong to the tunnel payload.
    pub buffered: Bytes,
}

/// The inbound side of a tunnel session
#[async_trait]
pub trait ClientTransport: Send {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Read the request line and headers
    async fn read_request(&mut self) -> Result<RequestHead, RequestError>;

    /// Write a final response through the framing layer and close the write side
    async fn respond(&mut self, status: StatusCode, body: &str) -> io::Result<()>;

    /// Take exclusive control of the raw stream
    fn hijack(&mut self) -> Result<Hijacked<Self::Io>, HijackError>;
}

/// HTTP/1.1 framing over any byte stream
pub struct HttpConnection<S> {
    reader: Option<BufReader<S>>,
}

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self {
            reader: Some(BufReader::new(stream)),
        }
    }

    #[cfg(test)]
    fn is_detached(&self) -> bool {
        self.reader.is_none()
    }

    fn reader_mut(&mut self) -> io::Result<&mut BufReader<S>> {
        self.reader.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                "connection detached from the HTTP layer",
            )
        })
    }
}

#[async_trait]
impl<S> ClientTransport for HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Io = S;

    async fn read_request(&mut self) -> Result<RequestHead, RequestError> {
        let reader = self.reader_mut()?;
        read_request_head(reader).await
    }

    async fn respond(&mut self, status: StatusCode, body: &str) -> io::Result<()> {
        let stream = self.reader_mut()?.get_mut();
        stream.write_all(&format_response(status, body)).await?;
        stream.flush().await?;
        stream.shutdown().await
    }

    fn hijack(&mut self) -> Result<Hijacked<S>, HijackError> {
        let reader = self.reader.take().ok_or(HijackError::AlreadyDetached)?;
        let buffered = Bytes::copy_from_slice(reader.buffer());
        Ok(Hijacked {
            io: reader.into_inner(),
            buffered,
        })
    }
}
