//! Mock implementations for testing
//!
//! [`MockTransport`] stands in for a broker session. Its paired [`MockBroker`]
//! scripts what the transport reports and records every call the manager makes.
//! [`RecordingHooks`] captures what reaches the unit.

use crate::link::{LinkHandle, LinkHooks};
use crate::protocol::Payload;
use crate::transport::{MessageId, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

pub type PublishedMessage = (String, Vec<u8>);

/// Item pushed by the broker side into the transport's network loop
#[derive(Debug)]
enum Scripted {
    Event(TransportEvent),
    Error(TransportError),
}

/// Calls observed and failures scheduled
#[derive(Debug)]
struct MockState {
    connects: u32,
    reconnect_attempts: Vec<Instant>,
    subscriptions: Vec<String>,
    unsubscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    disconnects: u32,
    auto_connack: bool,
    fail_connect: bool,
    reconnect_failures: u32,
    fail_publish: bool,
    failing_subscriptions: HashSet<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            connects: 0,
            reconnect_attempts: Vec::new(),
            subscriptions: Vec::new(),
            unsubscriptions: Vec::new(),
            published: Vec::new(),
            disconnects: 0,
            auto_connack: true,
            fail_connect: false,
            reconnect_failures: 0,
            fail_publish: false,
            failing_subscriptions: HashSet::new(),
        }
    }
}

/// Scripted transport; never touches the network
#[derive(Debug)]
pub struct MockTransport {
    inbox: mpsc::UnboundedReceiver<Scripted>,
    pending: VecDeque<TransportEvent>,
    state: Arc<Mutex<MockState>>,
    next_mid: MessageId,
}

/// Broker side of a [`MockTransport`]
#[derive(Debug, Clone)]
pub struct MockBroker {
    outbox: mpsc::UnboundedSender<Scripted>,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockTransport, MockBroker) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MockState::default()));

        let transport = MockTransport {
            inbox,
            pending: VecDeque::new(),
            state: state.clone(),
            next_mid: 0,
        };
        (transport, MockBroker { outbox, state })
    }
}

impl MockBroker {
    /// Report a successful session handshake
    pub fn connack(&self) {
        self.inject(TransportEvent::ConnAck);
    }

    /// Cut the session from the broker side
    pub fn drop_connection(&self) {
        self.inject(TransportEvent::Disconnected { requested: false });
    }

    /// Deliver a raw payload on `topic`
    pub fn deliver(&self, topic: &str, payload: impl Into<Bytes>) {
        self.inject(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        });
    }

    /// Deliver a JSON payload on `topic`
    pub fn deliver_json(&self, topic: &str, payload: &Value) {
        self.deliver(topic, payload.to_string());
    }

    pub fn inject(&self, event: TransportEvent) {
        let _ = self.outbox.send(Scripted::Event(event));
    }

    /// Make the next `service` call fail with `error`
    pub fn fail_service(&self, error: TransportError) {
        let _ = self.outbox.send(Scripted::Error(error));
    }

    /// Whether a successful connect or reconnect reports ConnAck by itself
    pub async fn set_auto_connack(&self, enabled: bool) {
        self.state.lock().await.auto_connack = enabled;
    }

    pub async fn fail_connect(&self, fail: bool) {
        self.state.lock().await.fail_connect = fail;
    }

    /// Make the next `count` reconnect calls fail
    pub async fn fail_next_reconnects(&self, count: u32) {
        self.state.lock().await.reconnect_failures = count;
    }

    pub async fn fail_publish(&self, fail: bool) {
        self.state.lock().await.fail_publish = fail;
    }

    pub async fn fail_subscribe(&self, topic: &str) {
        self.state
            .lock()
            .await
            .failing_subscriptions
            .insert(topic.to_string());
    }

    pub async fn connects(&self) -> u32 {
        self.state.lock().await.connects
    }

    pub async fn reconnect_attempts(&self) -> Vec<Instant> {
        self.state.lock().await.reconnect_attempts.clone()
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.state.lock().await.subscriptions.clone()
    }

    pub async fn unsubscriptions(&self) -> Vec<String> {
        self.state.lock().await.unsubscriptions.clone()
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().await.published.clone()
    }

    /// Published payloads decoded as JSON
    pub async fn published_json(&self) -> Vec<(String, Value)> {
        self.published()
            .await
            .into_iter()
            .filter_map(|(topic, bytes)| {
                serde_json::from_slice::<Value>(&bytes)
                    .ok()
                    .map(|value| (topic, value))
            })
            .collect()
    }

    pub async fn disconnects(&self) -> u32 {
        self.state.lock().await.disconnects
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.connects += 1;

        if state.fail_connect {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        if state.auto_connack {
            self.pending.push_back(TransportEvent::ConnAck);
        }
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.reconnect_attempts.push(Instant::now());

        if state.reconnect_failures > 0 {
            state.reconnect_failures -= 1;
            return Err(TransportError::Connect("broker unreachable".to_string()));
        }

        if state.auto_connack {
            self.pending.push_back(TransportEvent::ConnAck);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.state.lock().await.disconnects += 1;
        self.pending
            .push_back(TransportEvent::Disconnected { requested: true });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.subscriptions.push(topic.to_string());

        if state.failing_subscriptions.contains(topic) {
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "not authorized".to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.state
            .lock()
            .await
            .unsubscriptions
            .push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<MessageId, TransportError> {
        let mut state = self.state.lock().await;

        if state.fail_publish {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "request queue full".to_string(),
            });
        }

        state.published.push((topic.to_string(), payload));
        self.next_mid += 1;
        Ok(self.next_mid)
    }

    async fn service(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        match tokio::time::timeout(timeout, self.inbox.recv()).await {
            Ok(Some(Scripted::Event(event))) => Ok(Some(event)),
            Ok(Some(Scripted::Error(error))) => Err(error),
            Ok(None) => {
                // Broker handle dropped; behave like an idle network
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

/// What a [`RecordingHooks`] has seen
#[derive(Debug, Default)]
struct HookLog {
    loads: u32,
    quits: u32,
    messages: Vec<(String, Payload)>,
}

/// Hooks that record every call
#[derive(Debug, Clone, Default)]
pub struct RecordingHooks {
    log: Arc<Mutex<HookLog>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn loads(&self) -> u32 {
        self.log.lock().await.loads
    }

    pub async fn quits(&self) -> u32 {
        self.log.lock().await.quits
    }

    pub async fn messages(&self) -> Vec<(String, Payload)> {
        self.log.lock().await.messages.clone()
    }
}

#[async_trait]
impl LinkHooks for RecordingHooks {
    async fn load(&mut self, _link: &LinkHandle) {
        self.log.lock().await.loads += 1;
    }

    async fn handle_message(&mut self, _link: &LinkHandle, topic: &str, payload: &Payload) {
        self.log
            .lock()
            .await
            .messages
            .push((topic.to_string(), payload.clone()));
    }

    async fn quit(&mut self) {
        self.log.lock().await.quits += 1;
    }
}
