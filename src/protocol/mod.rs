//! Translation between relay calls and the pool's line protocol.
//!
//! Requests are single comma-separated lines; replies are bare
//! comma-separated values. The pure encoders and classifiers live in the
//! submodules; [`ProtocolBridge`] runs them against a registered session and
//! tears the session down when its transport fails.

pub mod handshake;
pub mod job;
pub mod submit;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ProtocolSettings;
use crate::errors::{RelayError, RelayResult};
use crate::gateway::{Session, SessionRegistry};

pub use job::{Job, JobRequest};
pub use submit::{SubmitRequest, Verdict};

// -----------------------------------------------------------------------------
// ----- ProtocolBridge --------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ProtocolBridge {
    settings: ProtocolSettings,
    receive_timeout: Duration,
}

impl ProtocolBridge {
    pub fn new(settings: ProtocolSettings, receive_timeout: Duration) -> Self {
        Self {
            settings,
            receive_timeout,
        }
    }

    pub fn difficulty_tag(&self) -> &str {
        &self.settings.difficulty_tag
    }

    pub async fn request_job(
        &self,
        registry: &SessionRegistry,
        client_id: &str,
        request: &JobRequest,
    ) -> RelayResult<Job> {
        let session = registry.get(client_id)?;

        let outcome = session
            .until_closed(async {
                let mut transport = session.transport().await;
                job::exchange(transport.as_mut(), request, &self.settings, self.receive_timeout)
                    .await
            })
            .await;

        settle(registry, &session, outcome).await
    }

    pub async fn submit_result(
        &self,
        registry: &SessionRegistry,
        client_id: &str,
        request: &SubmitRequest,
    ) -> RelayResult<Verdict> {
        let session = registry.get(client_id)?;

        let outcome = session
            .until_closed(async {
                let mut transport = session.transport().await;
                submit::exchange(transport.as_mut(), request, self.receive_timeout).await
            })
            .await;

        settle(registry, &session, outcome).await
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// A transport failure means the session cannot be reused; anything else
/// leaves it registered. `None` means the session was closed under the
/// exchange (disconnect, replacement or TTL sweep), which the caller sees as
/// not connected.
async fn settle<T>(
    registry: &SessionRegistry,
    session: &Arc<Session>,
    outcome: Option<RelayResult<T>>,
) -> RelayResult<T> {
    let Some(outcome) = outcome else {
        debug!(client_id = session.client_id(), "exchange cut short by session close");
        return Err(RelayError::not_connected(session.client_id()));
    };

    match &outcome {
        Ok(_) => session.touch(),
        Err(e) if e.is_transport() => {
            warn!(client_id = session.client_id(), "dropping pool session: {e}");
            registry.evict(session).await;
        }
        Err(_) => session.touch(),
    }

    outcome
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
