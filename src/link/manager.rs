//! Connection manager: session supervision, reconnect loop and dispatch

use super::backoff::{Backoff, ReconnectConfig};
use super::handle::{LinkHandle, LinkStats, Outbound};
use super::hooks::LinkHooks;
use super::shutdown::Shutdown;
use super::state::{self, next_state, SessionEvent, SessionState};
use super::LinkOptions;
use crate::error::{LinkError, LinkResult};
use crate::protocol::{decode_payload, route_payload, Delivery};
use crate::transport::{Transport, TransportError, TransportEvent};
use bytes::Bytes;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// What the run loop is doing
#[derive(Debug)]
enum Phase {
    /// Servicing the transport and the outbound queue
    Servicing,
    /// Waiting out backoff delays until a reconnect call succeeds
    Reconnecting(Backoff),
}

/// Outcome of one wait in the service loop
enum Step {
    Shutdown,
    Outbound(Option<Outbound>),
    Serviced(Result<Option<TransportEvent>, TransportError>),
}

/// Keeps one broker session alive and feeds its traffic to a unit's hooks
pub struct ConnectionManager<T, H> {
    transport: T,
    hooks: H,
    topics: Vec<String>,
    identity: Option<Arc<str>>,
    shutdown: Shutdown,
    service_timeout: Duration,
    error_sleep: Duration,
    reconnect: ReconnectConfig,
    state_tx: watch::Sender<SessionState>,
    outbound_rx: mpsc::Receiver<Outbound>,
    handle: LinkHandle,
    stats: Arc<LinkStats>,
    phase: Phase,
    retries: u32,
    sessions: u64,
}

impl<T, H> ConnectionManager<T, H>
where
    T: Transport + 'static,
    H: LinkHooks,
{
    pub fn new(transport: T, hooks: H, options: LinkOptions) -> LinkResult<Self> {
        if options.topics.is_empty() {
            return Err(LinkError::InvalidOptions(
                "at least one topic is required".to_string(),
            ));
        }

        if options.outbound_capacity == 0 {
            return Err(LinkError::InvalidOptions(
                "outbound capacity must be greater than 0".to_string(),
            ));
        }

        let identity: Option<Arc<str>> = options.identity.map(Arc::from);
        let shutdown = options.shutdown.unwrap_or_default();
        let stats = Arc::new(LinkStats::default());
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_capacity);

        let handle = LinkHandle::new(
            state_rx,
            outbound_tx,
            identity.clone(),
            shutdown.clone(),
            stats.clone(),
        );

        Ok(Self {
            transport,
            hooks,
            topics: options.topics,
            identity,
            shutdown,
            service_timeout: options.service_timeout,
            error_sleep: options.error_sleep,
            reconnect: options.reconnect,
            state_tx,
            outbound_rx,
            handle,
            stats,
            phase: Phase::Servicing,
            retries: 0,
            sessions: 0,
        })
    }

    /// Handle for querying the session and publishing from other tasks
    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Run the manager on its own task
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Load hooks, service the session until shutdown, then tear down
    ///
    /// Errors and hook panics that stop the service loop are logged here;
    /// `quit` and the disconnect still run.
    pub async fn run(mut self) {
        let span = crate::lifecycle_span!(unit = self.identity.as_deref().unwrap_or("-"));
        async move {
            info!(topics = ?self.topics, "Link starting");

            let handle = self.handle.clone();
            let loaded = AssertUnwindSafe(self.hooks.load(&handle)).catch_unwind().await;
            let served = match loaded {
                Ok(()) => AssertUnwindSafe(self.serve()).catch_unwind().await,
                Err(panic) => Err(panic),
            };

            match served {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.crashed(&e.to_string()),
                Err(panic) => self.crashed(&panic_message(panic.as_ref())),
            }

            if let Err(panic) = AssertUnwindSafe(self.hooks.quit()).catch_unwind().await {
                error!(panic = %panic_message(panic.as_ref()), "Quit hook panicked");
            }
            self.teardown().await;
            info!("Link stopped");
        }
        .instrument(span)
        .await
    }

    fn crashed(&self, reason: &str) {
        error!(error = %reason, "Link crashed, shutting down");
        self.shutdown.trigger();
    }

    async fn serve(&mut self) -> LinkResult<()> {
        self.connect().await;

        while !self.shutdown.is_triggered() {
            match std::mem::replace(&mut self.phase, Phase::Servicing) {
                Phase::Servicing => self.service_once().await?,
                Phase::Reconnecting(backoff) => self.reconnect_loop(backoff).await?,
            }
        }

        Ok(())
    }

    async fn connect(&mut self) {
        self.apply(SessionEvent::ConnectStarted);

        let result = self
            .transport
            .connect()
            .instrument(crate::mqtt_span!(operation = "connect"))
            .await;

        // Success is reported by the ConnAck event
        if let Err(e) = result {
            warn!(error = %e, "Initial connect failed, network loop will retry");
            self.apply(SessionEvent::ConnectFailed);
        }
    }

    async fn service_once(&mut self) -> LinkResult<()> {
        // Session events go first so queued publishes see the latest state
        let step = tokio::select! {
            biased;
            _ = self.shutdown.wait() => Step::Shutdown,
            serviced = self.transport.service(self.service_timeout) => Step::Serviced(serviced),
            outbound = self.outbound_rx.recv() => Step::Outbound(outbound),
        };

        match step {
            Step::Shutdown => {
                info!("Shutdown requested, leaving service loop");
            }
            Step::Outbound(Some(outbound)) => self.publish(outbound).await,
            Step::Outbound(None) => {}
            Step::Serviced(Ok(Some(event))) => self.handle_event(event).await,
            Step::Serviced(Ok(None)) => {}
            Step::Serviced(Err(e)) if e.is_fatal() => return Err(e.into()),
            Step::Serviced(Err(e)) => {
                warn!(error = %e, "Network loop error");
                self.shutdown.sleep(self.error_sleep).await;
            }
        }

        Ok(())
    }

    async fn reconnect_loop(&mut self, backoff: Backoff) -> LinkResult<()> {
        loop {
            let delay = backoff.next_delay(self.retries);
            info!(
                attempt = self.retries + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting after delay"
            );

            if !self.shutdown.sleep(delay).await {
                info!("Shutdown signal received during reconnection delay, stopping");
                return Ok(());
            }

            self.apply(SessionEvent::ConnectStarted);
            let result = self
                .transport
                .reconnect()
                .instrument(crate::mqtt_span!(operation = "reconnect", attempt = self.retries + 1))
                .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(attempt = self.retries + 1, error = %e, "Reconnect failed");
                    self.apply(SessionEvent::ConnectFailed);
                    self.retries = self.retries.saturating_add(1);
                    self.stats.set_retries(self.retries);
                }
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnAck => self.on_connected().await,
            TransportEvent::ConnectFailed(reason) => {
                warn!(reason = %reason, "Broker refused connection");
                self.apply(SessionEvent::ConnectFailed);
            }
            TransportEvent::Disconnected { requested: true } => {
                info!("Disconnected on request");
                self.apply(SessionEvent::Disconnected);
            }
            TransportEvent::Disconnected { requested: false } => {
                self.apply(SessionEvent::Disconnected);
                if !self.shutdown.is_triggered() {
                    warn!("Unexpected disconnect, entering reconnect loop");
                    self.phase = Phase::Reconnecting(Backoff::new(self.reconnect.clone()));
                }
            }
            TransportEvent::Message { topic, payload } => self.dispatch(topic, payload).await,
            TransportEvent::SubAck { pkid } => {
                debug!(pkid, "Subscription acknowledged");
            }
            TransportEvent::Published { pkid } => {
                debug!(pkid, "Message published");
            }
        }
    }

    async fn on_connected(&mut self) {
        self.apply(SessionEvent::ConnAck);

        if self.sessions > 0 {
            self.stats.record_reconnect();
        }
        self.sessions += 1;
        self.retries = 0;
        self.stats.set_retries(0);

        for topic in &self.topics {
            match self.transport.subscribe(topic).await {
                Ok(()) => info!(topic = %topic, "Subscribed"),
                Err(e) => warn!(topic = %topic, error = %e, "Subscribe failed"),
            }
        }
    }

    async fn dispatch(&mut self, topic: String, raw: Bytes) {
        let payload = match decode_payload(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Malformed payload dropped");
                self.stats.record_dropped();
                return;
            }
        };

        match route_payload(self.identity.as_deref(), &payload) {
            Ok(Delivery::Accept) => {
                debug!(topic = %topic, "Dispatching message");
                self.stats.record_received();
                self.hooks
                    .handle_message(&self.handle, &topic, &payload)
                    .await;
            }
            Ok(Delivery::Reject { dest }) => {
                debug!(topic = %topic, dest = %dest, "Message for another unit dropped");
                self.stats.record_dropped();
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Malformed payload dropped");
                self.stats.record_dropped();
            }
        }
    }

    async fn publish(&mut self, outbound: Outbound) {
        // The session may have dropped since the message was queued
        if !self.state_tx.borrow().is_connected() {
            warn!(topic = %outbound.topic, "Publish while disconnected, message skipped");
            return;
        }

        match self
            .transport
            .publish(&outbound.topic, outbound.payload)
            .await
        {
            Ok(mid) => {
                debug!(topic = %outbound.topic, mid, "Payload handed to transport");
                self.stats.record_published();
            }
            Err(e) => warn!(topic = %outbound.topic, error = %e, "Publish failed"),
        }
    }

    async fn teardown(&mut self) {
        if self.state_tx.borrow().is_connected() {
            for topic in &self.topics {
                if let Err(e) = self.transport.unsubscribe(topic).await {
                    debug!(topic = %topic, error = %e, "Unsubscribe failed during teardown");
                }
            }
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Disconnect failed during teardown");
        }

        self.apply(SessionEvent::Disconnected);
    }

    fn apply(&self, event: SessionEvent) -> SessionState {
        let from = *self.state_tx.borrow();
        let to = next_state(from, event);
        state::log_state_transition(from, to);
        self.state_tx.send_replace(to);
        to
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::NoopHooks;
    use crate::testing::mocks::MockTransport;

    #[test]
    fn test_new_rejects_empty_topics() {
        let (transport, _broker) = MockTransport::new();
        let result = ConnectionManager::new(transport, NoopHooks, LinkOptions::new(Vec::<String>::new()));
        assert!(matches!(result, Err(LinkError::InvalidOptions(_))));
    }

    #[test]
    fn test_new_rejects_zero_capacity() {
        let (transport, _broker) = MockTransport::new();
        let options = LinkOptions::new(["room/temp"]).with_outbound_capacity(0);
        let result = ConnectionManager::new(transport, NoopHooks, options);
        assert!(matches!(result, Err(LinkError::InvalidOptions(_))));
    }

    #[test]
    fn test_new_starts_disconnected() {
        let (transport, _broker) = MockTransport::new();
        let manager =
            ConnectionManager::new(transport, NoopHooks, LinkOptions::new(["room/temp"])).unwrap();
        let handle = manager.handle();
        assert!(!handle.is_connected());
        assert_eq!(handle.state(), SessionState::Disconnected);
        assert!(!handle.shutdown_signal().is_triggered());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("hook exploded");
        assert_eq!(panic_message(boxed.as_ref()), "hook exploded");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_supplied_shutdown_is_shared() {
        let (transport, _broker) = MockTransport::new();
        let shutdown = Shutdown::new();
        let options = LinkOptions::new(["room/temp"]).with_shutdown(shutdown.clone());
        let manager = ConnectionManager::new(transport, NoopHooks, options).unwrap();

        shutdown.trigger();
        assert!(manager.handle().shutdown_signal().is_triggered());
    }
}
