use std::time::Duration;

use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- TransportError --------------------------------------------------------

/// Failure of the duplex channel to the pool. Any of these poisons the
/// session that saw it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to pool: {0}")]
    Connect(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("connection closed by pool")]
    Closed,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            WsError::Io(io) => TransportError::Io(io),
            other => TransportError::WebSocket(other.to_string()),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

// -----------------------------------------------------------------------------
// ----- RelayError ------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("client '{client_id}' is not connected; call connect first")]
    NotConnected { client_id: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RelayError {
    pub fn not_connected(client_id: impl Into<String>) -> Self {
        RelayError::NotConnected {
            client_id: client_id.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        RelayError::Protocol(message.into())
    }

    /// True when the session that produced this error can no longer be trusted.
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Transport(_))
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
