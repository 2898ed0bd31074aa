use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;

use super::Transport;
use crate::config::TransportKind;
use crate::errors::{TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// -----------------------------------------------------------------------------
// ----- WebSocketTransport ----------------------------------------------------

/// Lines carried in WebSocket text frames. One outgoing line per frame; an
/// incoming frame may hold several newline-separated lines, which are queued.
pub struct WebSocketTransport {
    stream: Option<WsStream>,
    pending: VecDeque<String>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("open", &self.stream.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- WebSocketTransport: Static --------------------------------------------

impl WebSocketTransport {
    pub async fn open(url: &str, connect_timeout: Duration) -> TransportResult<Self> {
        let (stream, _response) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(connect_timeout))?
            .map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;

        Ok(Self {
            stream: Some(stream),
            pending: VecDeque::new(),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- WebSocketTransport: Transport -----------------------------------------

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_line(&mut self, line: &str) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        trace!(tx = %line, "websocket send");
        stream.send(Message::text(line.to_string())).await?;
        Ok(())
    }

    async fn receive_line(&mut self, limit: Duration) -> TransportResult<String> {
        let deadline = Instant::now() + limit;

        loop {
            if let Some(line) = self.pending.pop_front() {
                trace!(rx = %line, "websocket receive");
                return Ok(line);
            }

            let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

            let next = timeout_at(deadline, stream.next())
                .await
                .map_err(|_| TransportError::Timeout(limit))?;

            match next {
                None => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => self.pending.extend(split_lines(text.as_str())),
                Some(Ok(Message::Binary(data))) => {
                    self.pending.extend(split_lines(&String::from_utf8_lossy(&data)))
                }
                Some(Ok(Message::Close(_))) => return Err(TransportError::Closed),
                // Pongs are queued by tungstenite and flushed on the next write.
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        self.pending.clear();

        match stream.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => match TransportError::from(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// A frame of "a\nb\n" carries two lines; a frame of "" carries one empty line.
fn split_lines(text: &str) -> impl Iterator<Item = String> + '_ {
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
