use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use super::session::{Session, SessionStats};
use crate::config::HandshakeSettings;
use crate::errors::{RelayError, RelayResult};
use crate::locator::PoolLocator;
use crate::protocol::handshake;
use crate::transport::Connector;

// -----------------------------------------------------------------------------
// ----- SessionRegistry -------------------------------------------------------

/// Owns every live session, keyed by client id.
///
/// The map lock guards map updates only. It is never held across network
/// I/O; sessions are taken out (or put in) under the lock and closed or
/// used after it is released.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    locator: Arc<dyn PoolLocator>,
    connector: Arc<dyn Connector>,
    handshake: HandshakeSettings,
    ttl: Duration,
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Static -----------------------------------------------

impl SessionRegistry {
    pub fn new(
        locator: Arc<dyn PoolLocator>,
        connector: Arc<dyn Connector>,
        handshake: HandshakeSettings,
        ttl: Duration,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            locator,
            connector,
            handshake,
            ttl,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Public -----------------------------------------------

impl SessionRegistry {
    /// Open a fresh session for `client_id`, replacing any previous one.
    ///
    /// Expired sessions of every client are swept first. On failure no
    /// session stays registered for `client_id`.
    pub async fn connect(&self, client_id: &str) -> RelayResult<Arc<Session>> {
        self.sweep_expired().await;

        let endpoint = self.locator.resolve().await;

        let mut transport = match self.connector.open(&endpoint).await {
            Ok(transport) => transport,
            Err(e) => {
                self.remove(client_id).await;
                return Err(e.into());
            }
        };

        let version = handshake::read_version(transport.as_mut(), &self.handshake).await;
        let session = Arc::new(Session::new(client_id, endpoint, version, transport));

        let displaced = {
            let mut sessions = self.sessions.lock();
            sessions.insert(client_id.to_string(), session.clone())
        };

        if let Some(previous) = displaced {
            info!(client_id, "replacing existing pool session");
            previous.close().await;
        }

        Ok(session)
    }

    pub fn get(&self, client_id: &str) -> RelayResult<Arc<Session>> {
        self.sessions
            .lock()
            .get(client_id)
            .cloned()
            .ok_or_else(|| RelayError::not_connected(client_id))
    }

    /// Idempotent. Returns whether a session was registered.
    pub async fn remove(&self, client_id: &str) -> bool {
        let removed = { self.sessions.lock().remove(client_id) };

        match removed {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    /// Drop `session` after it failed mid-exchange. Only unregisters it if it
    /// is still the current session for its client; a newer session from a
    /// concurrent reconnect is left alone. The failed session is closed
    /// either way.
    pub async fn evict(&self, session: &Arc<Session>) -> bool {
        let removed = {
            let mut sessions = self.sessions.lock();
            let current = sessions
                .get(session.client_id())
                .is_some_and(|registered| Arc::ptr_eq(registered, session));
            if current {
                sessions.remove(session.client_id());
            }
            current
        };

        session.close().await;
        removed
    }

    /// Close and forget every session older than the TTL.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();

        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.is_expired(now, self.ttl))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            info!(client_id = session.client_id(), "evicting expired pool session");
            session.close().await;
        }

        expired.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn snapshot(&self) -> Vec<SessionStats> {
        let now = Instant::now();
        let mut stats: Vec<SessionStats> = {
            let sessions = self.sessions.lock();
            sessions.values().map(|session| session.stats(now)).collect()
        };
        stats.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        stats
    }

    /// Close every live session. Used on process shutdown.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock();
            sessions.drain().map(|(_, session)| session).collect()
        };

        if !drained.is_empty() {
            warn!(count = drained.len(), "closing pool sessions on shutdown");
        }

        for session in &drained {
            session.close().await;
        }

        drained.len()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::locator::{PoolEndpoint, StaticPoolLocator};
    use crate::transport::mock::{Probe, ScriptedConnector, ScriptedTransport};
    use tokio::time::timeout;

    const TTL: Duration = Duration::from_secs(300);

    /// Deferred closes run on a spawned task; give it a few turns.
    async fn wait_for_closes(probe: &Probe, expected: usize) {
        for _ in 0..16 {
            if probe.closes() == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(probe.closes(), expected);
    }

    fn registry(connector: Arc<ScriptedConnector>) -> SessionRegistry {
        let locator = Arc::new(StaticPoolLocator::new(PoolEndpoint::new("127.0.0.1", 2813)));
        SessionRegistry::new(locator, connector, HandshakeSettings::default(), TTL)
    }

    #[tokio::test]
    async fn connect_registers_session_with_negotiated_version() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.push(ScriptedTransport::new(["3.2"]));
        let registry = registry(connector.clone());

        let session = registry.connect("rig-1").await.unwrap();

        assert_eq!(session.protocol_version(), "3.2");
        assert_eq!(registry.active_count(), 1);
        assert!(Arc::ptr_eq(&registry.get("rig-1").unwrap(), &session));
        assert_eq!(connector.opened(), vec![PoolEndpoint::new("127.0.0.1", 2813)]);
    }

    #[tokio::test]
    async fn silent_pool_still_connects_with_default_version() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.push(ScriptedTransport::new(Vec::<String>::new()));
        let registry = registry(connector);

        let session = registry.connect("rig-1").await.unwrap();
        assert_eq!(session.protocol_version(), "3.0");
    }

    #[tokio::test]
    async fn reconnect_replaces_and_closes_previous_session() {
        let connector = Arc::new(ScriptedConnector::new());
        let first = connector.push(ScriptedTransport::new(["3.0"]));
        let second = connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);

        let old = registry.connect("rig-1").await.unwrap();
        let new = registry.connect("rig-1").await.unwrap();

        assert_eq!(registry.active_count(), 1);
        assert!(old.is_closed());
        assert!(!new.is_closed());
        assert_eq!(first.closes(), 1);
        assert_eq!(second.closes(), 0);
    }

    #[tokio::test]
    async fn failed_connect_leaves_nothing_registered() {
        let connector = Arc::new(ScriptedConnector::new());
        let first = connector.push(ScriptedTransport::new(["3.0"]));
        connector.push_failure(TransportError::Connect("refused".into()));
        let registry = registry(connector);

        registry.connect("rig-1").await.unwrap();
        let err = registry.connect("rig-1").await.unwrap_err();

        assert!(err.is_transport());
        assert!(matches!(registry.get("rig-1"), Err(RelayError::NotConnected { .. })));
        assert_eq!(first.closes(), 1);
    }

    #[tokio::test]
    async fn get_unknown_is_not_connected() {
        let registry = registry(Arc::new(ScriptedConnector::new()));
        match registry.get("ghost") {
            Err(RelayError::NotConnected { client_id }) => assert_eq!(client_id, "ghost"),
            other => panic!("expected NotConnected, got {other:?}"),
        }
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let connector = Arc::new(ScriptedConnector::new());
        let probe = connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);
        registry.connect("rig-1").await.unwrap();

        assert!(registry.remove("rig-1").await);
        assert!(!registry.remove("rig-1").await);
        assert!(!registry.remove("never-seen").await);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_sweeps_expired_sessions_exactly_once() {
        let connector = Arc::new(ScriptedConnector::new());
        let stale = connector.push(ScriptedTransport::new(["3.0"]));
        let fresh = connector.push(ScriptedTransport::new(["3.0"]));
        let replacement = connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);

        let stale_session = registry.connect("stale").await.unwrap();
        tokio::time::advance(TTL - Duration::from_secs(10)).await;
        registry.connect("fresh").await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        // any client's connect triggers the sweep
        registry.connect("stale").await.unwrap();

        assert_eq!(stale.closes(), 1);
        assert!(stale_session.is_closed());
        assert_eq!(fresh.closes(), 0);
        assert_eq!(replacement.closes(), 0);
        assert_eq!(registry.active_count(), 2);

        // tearing down the replacement leaves the old transport alone
        registry.remove("stale").await;
        assert_eq!(stale.closes(), 1);
    }

    #[tokio::test]
    async fn evict_ignores_superseded_session() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.push(ScriptedTransport::new(["3.0"]));
        connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);

        let old = registry.connect("rig-1").await.unwrap();
        let new = registry.connect("rig-1").await.unwrap();

        assert!(!registry.evict(&old).await);
        assert!(Arc::ptr_eq(&registry.get("rig-1").unwrap(), &new));

        assert!(registry.evict(&new).await);
        assert!(registry.get("rig-1").is_err());
    }

    #[tokio::test]
    async fn interleaved_connects_keep_one_entry_per_client() {
        let connector = Arc::new(ScriptedConnector::new());
        let probes: Vec<_> = (0..8)
            .map(|_| connector.push(ScriptedTransport::new(["3.0"])))
            .collect();
        let registry = Arc::new(registry(connector));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            let client = if i % 2 == 0 { "even" } else { "odd" };
            tasks.push(tokio::spawn(async move { registry.connect(client).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.active_count(), 2);
        let open = probes.iter().filter(|p| p.closes() == 0).count();
        assert_eq!(open, 2);
        assert!(probes.iter().all(|p| p.closes() <= 1));
    }

    #[tokio::test(start_paused = true)]
    async fn map_lock_is_not_held_during_network_latency() {
        let latency = Duration::from_secs(20);
        let connector = Arc::new(ScriptedConnector::with_delay(latency));
        connector.push(ScriptedTransport::new(["3.0"]));
        connector.push(ScriptedTransport::new(["3.0"]));
        let registry = Arc::new(registry(connector));

        let started = Instant::now();
        let slow = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.connect("a").await })
        };
        tokio::task::yield_now().await;

        // the map stays usable while "a" is still opening its transport
        assert_eq!(registry.active_count(), 0);
        assert!(registry.get("b").is_err());

        let (a, b) = tokio::join!(slow, registry.connect("b"));
        a.unwrap().unwrap();
        b.unwrap();

        // both opens overlapped instead of queueing behind one lock
        assert!(started.elapsed() < latency * 2);
        assert_eq!(registry.active_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_does_not_wait_for_a_busy_session() {
        let connector = Arc::new(ScriptedConnector::new());
        let busy = connector.push(ScriptedTransport::new(["3.0"]));
        connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);

        let a = registry.connect("a").await.unwrap();
        let held = a.transport().await;
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        timeout(Duration::from_secs(5), registry.connect("b"))
            .await
            .expect("connect(b) waited on a's exchange")
            .unwrap();

        assert!(a.is_closed());
        assert!(registry.get("a").is_err());
        assert_eq!(registry.active_count(), 1);
        assert_eq!(busy.closes(), 0);

        drop(held);
        wait_for_closes(&busy, 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn remove_and_replace_do_not_wait_for_a_busy_session() {
        let connector = Arc::new(ScriptedConnector::new());
        let removed = connector.push(ScriptedTransport::new(["3.0"]));
        let replaced = connector.push(ScriptedTransport::new(["3.0"]));
        connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);

        let first = registry.connect("a").await.unwrap();
        let held_first = first.transport().await;
        let removed_in_time = timeout(Duration::from_secs(5), registry.remove("a")).await;
        assert_eq!(removed_in_time.ok(), Some(true));

        let second = registry.connect("a").await.unwrap();
        let held_second = second.transport().await;
        let third = timeout(Duration::from_secs(5), registry.connect("a"))
            .await
            .expect("reconnect waited on the old exchange")
            .unwrap();

        assert!(second.is_closed());
        assert!(!third.is_closed());
        assert!(Arc::ptr_eq(&registry.get("a").unwrap(), &third));
        assert_eq!((removed.closes(), replaced.closes()), (0, 0));

        drop(held_first);
        drop(held_second);
        wait_for_closes(&removed, 1).await;
        wait_for_closes(&replaced, 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_does_not_wait_for_a_busy_session() {
        let connector = Arc::new(ScriptedConnector::new());
        let busy = connector.push(ScriptedTransport::new(["3.0"]));
        let idle = connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);

        let a = registry.connect("a").await.unwrap();
        registry.connect("b").await.unwrap();
        let held = a.transport().await;

        let closed = timeout(Duration::from_secs(5), registry.shutdown()).await;
        assert_eq!(closed.ok(), Some(2));
        assert_eq!(idle.closes(), 1);

        drop(held);
        wait_for_closes(&busy, 1).await;
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let connector = Arc::new(ScriptedConnector::new());
        let a = connector.push(ScriptedTransport::new(["3.0"]));
        let b = connector.push(ScriptedTransport::new(["3.0"]));
        let registry = registry(connector);
        registry.connect("a").await.unwrap();
        registry.connect("b").await.unwrap();

        assert_eq!(registry.shutdown().await, 2);
        assert_eq!(registry.active_count(), 0);
        assert_eq!((a.closes(), b.closes()), (1, 1));
    }

    #[tokio::test]
    async fn snapshot_lists_sessions_sorted() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.push(ScriptedTransport::new(["3.1"]));
        connector.push(ScriptedTransport::new(["3.2"]));
        let registry = registry(connector);
        registry.connect("zeta").await.unwrap();
        registry.connect("alpha").await.unwrap();

        let snapshot = registry.snapshot();
        let ids: Vec<_> = snapshot.iter().map(|s| s.client_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
        assert_eq!(snapshot[1].protocol_version, "3.1");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
