use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::time::Instant;
use tracing::debug;

use crate::locator::PoolEndpoint;
use crate::transport::Transport;

// -----------------------------------------------------------------------------
// ----- Session ---------------------------------------------------------------

/// One client's live binding to the pool.
///
/// The transport sits behind an async mutex so that two calls for the same
/// client queue up instead of interleaving lines on the wire. Metadata lives
/// outside that mutex and can be read without waiting for an exchange.
///
/// Closing never waits for that mutex. It flips `cancel`, which aborts any
/// exchange running under [`Session::until_closed`], and closes the transport
/// as soon as the mutex is free.
pub struct Session {
    client_id: String,
    endpoint: PoolEndpoint,
    protocol_version: String,
    created_at: Instant,
    last_active_at: SyncMutex<Instant>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    closed: AtomicBool,
    cancel: watch::Sender<bool>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("endpoint", &self.endpoint)
            .field("protocol_version", &self.protocol_version)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub client_id: String,
    pub protocol_version: String,
    pub endpoint: PoolEndpoint,
    pub age_secs: u64,
    pub idle_secs: u64,
}

// -----------------------------------------------------------------------------
// ----- Session: Static -------------------------------------------------------

impl Session {
    pub fn new(
        client_id: impl Into<String>,
        endpoint: PoolEndpoint,
        protocol_version: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        let now = Instant::now();
        Self {
            client_id: client_id.into(),
            endpoint,
            protocol_version: protocol_version.into(),
            created_at: now,
            last_active_at: SyncMutex::new(now),
            transport: Arc::new(Mutex::new(transport)),
            closed: AtomicBool::new(false),
            cancel: watch::Sender::new(false),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Public -------------------------------------------------------

impl Session {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoint(&self) -> &PoolEndpoint {
        &self.endpoint
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn last_active_at(&self) -> Instant {
        *self.last_active_at.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Age strictly beyond `ttl`.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }

    /// Exclusive access to the transport for one exchange.
    pub async fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().await
    }

    pub fn touch(&self) {
        *self.last_active_at.lock() = Instant::now();
    }

    pub fn stats(&self, now: Instant) -> SessionStats {
        SessionStats {
            client_id: self.client_id.clone(),
            protocol_version: self.protocol_version.clone(),
            endpoint: self.endpoint.clone(),
            age_secs: now.saturating_duration_since(self.created_at).as_secs(),
            idle_secs: now.saturating_duration_since(self.last_active_at()).as_secs(),
        }
    }

    /// Run `work` unless the session closes first. `None` means the session
    /// was closed before or while `work` ran; `work` is dropped at that point.
    pub async fn until_closed<F: Future>(&self, work: F) -> Option<F::Output> {
        let mut cancel = self.cancel.subscribe();

        tokio::select! {
            biased;
            _ = cancel.wait_for(|closed| *closed) => None,
            output = work => Some(output),
        }
    }

    /// Close the transport. Only the first call reaches it; close errors are
    /// logged and dropped since the session is gone either way.
    ///
    /// Returns without waiting on an exchange that still holds the transport;
    /// that close finishes in the background once the holder lets go.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.cancel.send_replace(true);

        match self.transport.clone().try_lock_owned() {
            Ok(mut transport) => close_transport(&self.client_id, transport.as_mut()).await,
            Err(_) => {
                debug!(client_id = %self.client_id, "pool transport busy, closing once released");
                let transport = self.transport.clone();
                let client_id = self.client_id.clone();
                tokio::spawn(async move {
                    let mut transport = transport.lock_owned().await;
                    close_transport(&client_id, transport.as_mut()).await;
                });
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn close_transport(client_id: &str, transport: &mut dyn Transport) {
    if let Err(e) = transport.close().await {
        debug!(client_id, "error closing pool transport: {e}");
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
