//! The relay as seen by the request layer.
//!
//! Every call resolves to an [`Outcome`]: either `success=true` with its
//! payload, or `success=false` with a readable message and an error kind.
//! Nothing raised by the core escapes a single request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RelaySettings;
use crate::errors::{RelayError, TransportError};
use crate::gateway::{SessionRegistry, SessionStats};
use crate::locator::{self, PoolEndpoint, PoolLocator};
use crate::protocol::{Job, JobRequest, ProtocolBridge, SubmitRequest, Verdict};
use crate::transport::{Connector, TransportFactory};

// -----------------------------------------------------------------------------
// ----- Outcome ---------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConnected,
    Transport,
    Timeout,
    Protocol,
    InvalidRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Outcome<T> {
    pub success: bool,

    #[serde(flatten)]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn err(error: &RelayError) -> Self {
        let kind = match error {
            RelayError::NotConnected { .. } => ErrorKind::NotConnected,
            RelayError::Transport(TransportError::Timeout(_)) => ErrorKind::Timeout,
            RelayError::Transport(_) => ErrorKind::Transport,
            RelayError::Protocol(_) => ErrorKind::Protocol,
        };

        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(kind),
        }
    }

    /// The request never reached the core (unparseable body, missing field).
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_kind: Some(ErrorKind::InvalidRequest),
        }
    }

    fn from_result(result: Result<T, RelayError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(&e),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Payloads --------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Connected {
    pub version: String,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Disconnected {
    pub message: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub active_sessions: usize,
    pub sessions: Vec<SessionStats>,
}

// -----------------------------------------------------------------------------
// ----- Relay -----------------------------------------------------------------

pub struct Relay {
    registry: SessionRegistry,
    bridge: ProtocolBridge,
}

// -----------------------------------------------------------------------------
// ----- Relay: Static ---------------------------------------------------------

impl Relay {
    pub fn new(
        settings: &RelaySettings,
        locator: Arc<dyn PoolLocator>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let registry = SessionRegistry::new(
            locator,
            connector,
            settings.handshake.clone(),
            settings.session.ttl,
        );
        let bridge = ProtocolBridge::new(settings.protocol.clone(), settings.session.receive_timeout);

        Self { registry, bridge }
    }

    /// Production wiring: HTTP lookup (or static fallback) plus the
    /// configured transport kind.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        let locator = locator::from_settings(&settings.pool);
        let connector = Arc::new(TransportFactory::from_settings(&settings.pool, &settings.session));
        Self::new(settings, locator, connector)
    }
}

// -----------------------------------------------------------------------------
// ----- Relay: Public ---------------------------------------------------------

impl Relay {
    pub async fn connect(&self, client_id: &str) -> Outcome<Connected> {
        let result = self.registry.connect(client_id).await.map(|session| {
            let PoolEndpoint { host, port } = session.endpoint().clone();
            Connected {
                version: session.protocol_version().to_string(),
                host,
                port,
            }
        });

        match &result {
            Ok(connected) => info!(
                client_id,
                pool = %format!("{}:{}", connected.host, connected.port),
                version = %connected.version,
                "client connected to pool"
            ),
            Err(e) => warn!(client_id, "client failed to connect to pool: {e}"),
        }

        Outcome::from_result(result)
    }

    /// `difficulty_tag` falls back to the configured tag.
    pub async fn request_job(
        &self,
        client_id: &str,
        username: &str,
        key: Option<&str>,
        difficulty_tag: Option<&str>,
    ) -> Outcome<Job> {
        let request = JobRequest {
            username: username.to_string(),
            difficulty_tag: difficulty_tag
                .unwrap_or(self.bridge.difficulty_tag())
                .to_string(),
            key: key.map(str::to_string),
        };

        let result = self.bridge.request_job(&self.registry, client_id, &request).await;
        if let Err(e) = &result {
            warn!(client_id, "job request failed: {e}");
        }

        Outcome::from_result(result)
    }

    pub async fn submit_result(
        &self,
        client_id: &str,
        result: &str,
        hashrate: &str,
        rig_name: &str,
        key: Option<&str>,
    ) -> Outcome<Verdict> {
        let request = SubmitRequest {
            result: result.to_string(),
            hashrate: hashrate.to_string(),
            rig_name: rig_name.to_string(),
            key: key.map(str::to_string),
        };

        let verdict = self.bridge.submit_result(&self.registry, client_id, &request).await;
        if let Err(e) = &verdict {
            warn!(client_id, "submission failed: {e}");
        }

        Outcome::from_result(verdict)
    }

    /// Always succeeds; disconnecting an unknown client is a no-op.
    pub async fn disconnect(&self, client_id: &str) -> Outcome<Disconnected> {
        let message = if self.registry.remove(client_id).await {
            info!(client_id, "client disconnected from pool");
            "Disconnected"
        } else {
            "Not connected"
        };

        Outcome::ok(Disconnected { message })
    }

    pub fn status(&self) -> StatusReport {
        let sessions = self.registry.snapshot();
        StatusReport {
            status: "online",
            active_sessions: sessions.len(),
            sessions,
        }
    }

    pub async fn shutdown(&self) -> usize {
        self.registry.shutdown().await
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
