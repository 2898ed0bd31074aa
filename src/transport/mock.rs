//! Scripted in-memory transports for deterministic tests.
//!
//! A [`ScriptedTransport`] replays a fixed queue of receive results and
//! records what was sent. Nothing here touches real I/O, so it works under
//! `tokio::time::pause()`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connector, Transport};
use crate::config::TransportKind;
use crate::errors::{TransportError, TransportResult};
use crate::locator::PoolEndpoint;

// -----------------------------------------------------------------------------
// ----- Probe -----------------------------------------------------------------

/// Test-side view of a scripted transport that outlives it.
#[derive(Clone, Debug, Default)]
pub(crate) struct Probe {
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl Probe {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// How many times `close` reached the transport.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

// -----------------------------------------------------------------------------
// ----- ScriptedTransport -----------------------------------------------------

pub(crate) struct ScriptedTransport {
    incoming: VecDeque<TransportResult<String>>,
    partial: Option<String>,
    hold_reads: bool,
    fail_sends: bool,
    closed: bool,
    probe: Probe,
}

impl ScriptedTransport {
    /// Replays `lines` in order; once they run out, every read times out.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            incoming: lines.into_iter().map(|l| Ok(l.into())).collect(),
            partial: None,
            hold_reads: false,
            fail_sends: false,
            closed: false,
            probe: Probe::default(),
        }
    }

    /// Queue a receive failure after the lines given so far.
    pub fn then_fail(mut self, err: TransportError) -> Self {
        self.incoming.push_back(Err(err));
        self
    }

    /// Bytes that arrived without a terminator, left for `take_partial`.
    pub fn with_partial(mut self, partial: impl Into<String>) -> Self {
        self.partial = Some(partial.into());
        self
    }

    /// Once the queue runs out, reads wait for the whole timeout before
    /// failing, like a pool that went quiet.
    pub fn holding_reads(mut self) -> Self {
        self.hold_reads = true;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_line(&mut self, line: &str) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.fail_sends {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted send failure",
            )));
        }
        self.probe.sent.lock().push(line.to_string());
        Ok(())
    }

    async fn receive_line(&mut self, timeout: Duration) -> TransportResult<String> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(next) = self.incoming.pop_front() {
            return next;
        }
        if self.hold_reads {
            tokio::time::sleep(timeout).await;
        }
        Err(TransportError::Timeout(timeout))
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        Ok(())
    }

    fn take_partial(&mut self) -> Option<String> {
        self.partial.take()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }
}

// -----------------------------------------------------------------------------
// ----- ScriptedConnector -----------------------------------------------------

/// Hands out queued transports in order, optionally after a simulated
/// network delay. An empty queue refuses the connection.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    queue: Mutex<VecDeque<TransportResult<ScriptedTransport>>>,
    delay: Duration,
    opened: Mutex<Vec<PoolEndpoint>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Queue a transport; returns its probe.
    pub fn push(&self, transport: ScriptedTransport) -> Probe {
        let probe = transport.probe();
        self.queue.lock().push_back(Ok(transport));
        probe
    }

    pub fn push_failure(&self, err: TransportError) {
        self.queue.lock().push_back(Err(err));
    }

    pub fn opened(&self) -> Vec<PoolEndpoint> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, endpoint: &PoolEndpoint) -> TransportResult<Box<dyn Transport>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.opened.lock().push(endpoint.clone());

        let next = self.queue.lock().pop_front();
        match next {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(err)) => Err(err),
            None => Err(TransportError::Connect(format!("{endpoint}: refused"))),
        }
    }
}
