//! Cloneable handle onto a running link
//!
//! Any task can query connectivity and queue publishes through a `LinkHandle`;
//! only the manager task talks to the transport.

use super::shutdown::Shutdown;
use super::state::SessionState;
use crate::error::PublishError;
use crate::protocol::{encode_payload, Payload};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Serialized publish waiting for the manager task
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Counters maintained by the manager
#[derive(Debug, Default)]
pub struct LinkStats {
    retries: AtomicU32,
    reconnects: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    published: AtomicU64,
}

impl LinkStats {
    /// Reconnect attempts in the current disconnect episode
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Successful reconnections since start
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Messages handed to the message hook
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Inbound messages dropped as malformed or addressed elsewhere
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Payloads handed to the transport
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub(crate) fn set_retries(&self, retries: u32) {
        self.retries.store(retries, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle shared with hooks and application tasks
#[derive(Debug, Clone)]
pub struct LinkHandle {
    state_rx: watch::Receiver<SessionState>,
    outbound_tx: mpsc::Sender<Outbound>,
    identity: Option<Arc<str>>,
    shutdown: Shutdown,
    stats: Arc<LinkStats>,
}

impl LinkHandle {
    pub(crate) fn new(
        state_rx: watch::Receiver<SessionState>,
        outbound_tx: mpsc::Sender<Outbound>,
        identity: Option<Arc<str>>,
        shutdown: Shutdown,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            state_rx,
            outbound_tx,
            identity,
            shutdown,
            stats,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// True iff the broker session is up
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn shutdown_signal(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Ask the manager to stop
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait until the session is up, or give up after `timeout`
    ///
    /// Returns whether the session is connected.
    pub async fn wait_until_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.state_rx.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(SessionState::is_connected)).await;
        matches!(waited, Ok(Ok(_)))
    }

    /// Publish a JSON object on `topic`, tagged with this unit's identity
    ///
    /// Nothing is queued while disconnected or when no `unitID` can be set.
    /// Delivery is at most once.
    pub fn send_message(&self, topic: &str, payload: Payload) -> Result<(), PublishError> {
        if !self.is_connected() {
            warn!(topic = %topic, "Publish while disconnected, message skipped");
            return Err(PublishError::NotConnected);
        }

        let bytes = encode_payload(payload, self.identity()).map_err(|e| {
            warn!(topic = %topic, error = %e, "Missing identity, message skipped");
            PublishError::from(e)
        })?;

        self.outbound_tx
            .try_send(Outbound {
                topic: topic.to_string(),
                payload: bytes,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(topic = %topic, "Outbound queue full, message skipped");
                    PublishError::QueueFull
                }
                mpsc::error::TrySendError::Closed(_) => PublishError::Stopped,
            })?;

        debug!(topic = %topic, "Message queued for publish");
        Ok(())
    }
}
