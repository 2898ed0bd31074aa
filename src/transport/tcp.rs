use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use memchr::memchr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::trace;

use super::Transport;
use crate::config::TransportKind;
use crate::errors::{TransportError, TransportResult};
use crate::locator::PoolEndpoint;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const READ_CAPACITY_HINT: usize = 1024;

/// Upper bound for a single unterminated line; the pool never sends more.
const MAX_LINE_LEN: usize = 64 * 1024;

// -----------------------------------------------------------------------------
// ----- TcpTransport ----------------------------------------------------------

#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    buffer: BytesMut,
}

// -----------------------------------------------------------------------------
// ----- TcpTransport: Static --------------------------------------------------

impl TcpTransport {
    pub async fn open(endpoint: &PoolEndpoint, connect_timeout: Duration) -> TransportResult<Self> {
        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));

        let stream = timeout(connect_timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout(connect_timeout))?
            .map_err(|e| TransportError::Connect(format!("{endpoint}: {e}")))?;

        stream.set_nodelay(true)?;

        Ok(Self::new(stream))
    }

    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
            buffer: BytesMut::with_capacity(READ_CAPACITY_HINT),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- TcpTransport: Transport -----------------------------------------------

#[async_trait]
impl Transport for TcpTransport {
    async fn send_line(&mut self, line: &str) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        trace!(tx = %line, "tcp send");

        let mut frame = BytesMut::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.extend_from_slice(b"\n");

        stream.write_all_buf(&mut frame).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive_line(&mut self, limit: Duration) -> TransportResult<String> {
        let deadline = Instant::now() + limit;

        loop {
            if let Some(line) = take_line(&mut self.buffer) {
                trace!(rx = %line, "tcp receive");
                return Ok(line);
            }

            if self.buffer.len() > MAX_LINE_LEN {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "line exceeds maximum length",
                )));
            }

            let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
            self.buffer.reserve(READ_CAPACITY_HINT);

            // read_buf is cancel safe: bytes already read stay in the buffer.
            let n = timeout_at(deadline, stream.read_buf(&mut self.buffer))
                .await
                .map_err(|_| TransportError::Timeout(limit))??;

            if n == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        self.buffer.clear();

        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn take_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }

        let raw = self.buffer.split();
        Some(String::from_utf8_lossy(&raw).into_owned())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// Pop one complete line off the front of `buffer`, dropping `\n` / `\r\n`.
fn take_line(buffer: &mut BytesMut) -> Option<String> {
    let pos = memchr(b'\n', &buffer[..])?;
    let raw = buffer.split_to(pos + 1);

    let mut line = &raw[..pos];
    if let [rest @ .., b'\r'] = line {
        line = rest;
    }

    Some(String::from_utf8_lossy(line).into_owned())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
