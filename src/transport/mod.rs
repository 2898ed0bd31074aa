//! Line-oriented duplex channels to the pool.
//!
//! The pool speaks newline-terminated ASCII. [`Transport`] hides whether those
//! lines travel over a raw TCP stream or inside WebSocket text frames; the
//! variant is picked by configuration through [`TransportFactory`].

pub mod tcp;
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{PoolSettings, SessionSettings, TransportKind, WebSocketScheme};
use crate::errors::TransportResult;
use crate::locator::PoolEndpoint;

pub use tcp::TcpTransport;
pub use websocket::WebSocketTransport;

// -----------------------------------------------------------------------------
// ----- Transport -------------------------------------------------------------

/// One line in, one line out. No implicit retries.
#[async_trait]
pub trait Transport: Send {
    /// Write `line` followed by the variant's line terminator.
    async fn send_line(&mut self, line: &str) -> TransportResult<()>;

    /// Read the next line, without its terminator. Fails with
    /// `TransportError::Timeout` once `timeout` elapses.
    async fn receive_line(&mut self, timeout: Duration) -> TransportResult<String>;

    /// Idempotent; closing an already closed transport is `Ok`.
    async fn close(&mut self) -> TransportResult<()>;

    /// Hand over whatever arrived without a line terminator and empty the
    /// read buffer. Framed variants never hold partial lines.
    fn take_partial(&mut self) -> Option<String> {
        None
    }

    fn kind(&self) -> TransportKind;
}

// -----------------------------------------------------------------------------
// ----- Connector -------------------------------------------------------------

/// Opens transports. The registry only ever sees this seam, so tests can
/// hand it scripted channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &PoolEndpoint) -> TransportResult<Box<dyn Transport>>;
}

// -----------------------------------------------------------------------------
// ----- TransportFactory ------------------------------------------------------

#[derive(Clone, Debug)]
pub struct TransportFactory {
    kind: TransportKind,
    connect_timeout: Duration,
    websocket_scheme: WebSocketScheme,
    websocket_path: String,
}

impl TransportFactory {
    pub fn new(kind: TransportKind, connect_timeout: Duration) -> Self {
        Self {
            kind,
            connect_timeout,
            websocket_scheme: WebSocketScheme::Ws,
            websocket_path: "/".to_string(),
        }
    }

    pub fn from_settings(pool: &PoolSettings, session: &SessionSettings) -> Self {
        Self {
            kind: pool.transport,
            connect_timeout: session.connect_timeout,
            websocket_scheme: pool.websocket_scheme,
            websocket_path: pool.websocket_path.clone(),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn websocket_url(&self, endpoint: &PoolEndpoint) -> String {
        let path = if self.websocket_path.starts_with('/') {
            self.websocket_path.clone()
        } else {
            format!("/{}", self.websocket_path)
        };

        format!(
            "{}://{}:{}{}",
            self.websocket_scheme.as_str(),
            endpoint.host,
            endpoint.port,
            path
        )
    }
}

#[async_trait]
impl Connector for TransportFactory {
    async fn open(&self, endpoint: &PoolEndpoint) -> TransportResult<Box<dyn Transport>> {
        match self.kind {
            TransportKind::Tcp => {
                let transport = TcpTransport::open(endpoint, self.connect_timeout).await?;
                Ok(Box::new(transport))
            }
            TransportKind::Websocket => {
                let url = self.websocket_url(endpoint);
                let transport = WebSocketTransport::open(&url, self.connect_timeout).await?;
                Ok(Box::new(transport))
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
