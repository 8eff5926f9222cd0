//! HTTP/1.x request-head parsing and response formatting
//!
//! Only what the CONNECT handshake needs: the request line, the header block,
//! and short plain-text error responses. Parsing is done by `httparse` over
//! the connection's read buffer so that bytes following the head stay
//! buffered for the tunnel.

use http::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;

/// Upper bound for the request line plus headers
pub const MAX_REQUEST_HEAD_SIZE: usize = 8 * 1024;

/// Maximum number of headers to parse
const MAX_HEADERS: usize = 64;

/// Handshake acknowledgement written on the detached stream
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Client closed the connection before sending a request")]
    Closed,

    #[error("Request head exceeds {MAX_REQUEST_HEAD_SIZE} bytes")]
    TooLarge,

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed request line and headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Request target; `host:port` for CONNECT
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

#[cfg(test)]
impl RequestHead {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one request head, consuming exactly up to and including the blank line.
///
/// Bytes after the head stay in the reader's buffer.
pub async fn read_request_head<R>(reader: &mut R) -> Result<RequestHead, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::new();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(if head.is_empty() {
                RequestError::Closed
            } else {
                RequestError::Malformed("unexpected end of request head".to_string())
            });
        }

        let previous = head.len();
        let take = available.len().min(MAX_REQUEST_HEAD_SIZE - previous);
        head.extend_from_slice(&available[..take]);

        match parse_head(&head)? {
            Some((request, header_len)) => {
                reader.consume(header_len - previous);
                return Ok(request);
            }
            None => {
                reader.consume(take);
                if head.len() >= MAX_REQUEST_HEAD_SIZE {
                    return Err(RequestError::TooLarge);
                }
                trace!("Request head incomplete after {} bytes", head.len());
            }
        }
    }
}

/// Parse a buffered head; `None` while more bytes are needed
fn parse_head(buffer: &[u8]) -> Result<Option<(RequestHead, usize)>, RequestError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let header_len = match req.parse(buffer) {
        Ok(httparse::Status::Complete(header_len)) => header_len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(RequestError::Malformed(e.to_string())),
    };

    let (Some(method), Some(target), Some(version)) = (req.method, req.path, req.version) else {
        return Err(RequestError::Malformed("incomplete request line".to_string()));
    };

    let mut parsed_headers = Vec::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let value = std::str::from_utf8(header.value).map_err(|_| {
            RequestError::Malformed(format!("header {:?} is not valid UTF-8", header.name))
        })?;
        parsed_headers.push((header.name.to_string(), value.to_string()));
    }

    let request = RequestHead {
        method: method.to_string(),
        target: target.to_string(),
        version: format!("HTTP/1.{}", version),
        headers: parsed_headers,
    };
    Ok(Some((request, header_len)))
}

/// Format a complete plain-text response that ends the connection
pub fn format_response(status: StatusCode, body: &str) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len() + 1
    );
    if status == StatusCode::METHOD_NOT_ALLOWED {
        response.push_str("Allow: CONNECT\r\n");
    }
    response.push_str("\r\n");
    response.push_str(body);
    response.push('\n');
    response.into_bytes()
}
