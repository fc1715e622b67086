//! Transport layer for the broker session
//!
//! This module provides the transport abstraction driven by the connection
//! manager, plus the MQTT implementation built on rumqttc.

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Message identifier handed back by a publish call
pub type MessageId = u64;

/// Events surfaced by one iteration of the transport's network loop
///
/// These replace the callback set of a classic MQTT client: the manager
/// receives them in order from [`Transport::service`] and reacts on its own task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker accepted the session (CONNACK success)
    ConnAck,
    /// Broker refused the session or the connect handshake failed
    ConnectFailed(String),
    /// Session ended; `requested` is true when the local side asked for it
    Disconnected { requested: bool },
    /// Inbound publish on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Subscription acknowledged by the broker
    SubAck { pkid: u16 },
    /// Outgoing publish written to the network
    Published { pkid: u16 },
}

/// Errors raised by a transport binding
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Network loop error: {0}")]
    Service(String),
    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("Unsubscribe from {topic} failed: {reason}")]
    Unsubscribe { topic: String, reason: String },
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("Disconnect failed: {0}")]
    Disconnect(String),
    /// Unrecoverable failure; the manager stops and tears down
    #[error("Transport failed permanently: {0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether the manager should give up servicing this transport
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Fatal(_))
    }
}

/// Transport binding driven by the connection manager
///
/// A binding is owned by exactly one manager and is only ever called from the
/// manager's task, so methods take `&mut self` and need not be `Sync`.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Open the broker session (host, port, keepalive and credentials come from the binding)
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Re-open the session after an unexpected disconnect
    async fn reconnect(&mut self) -> Result<(), TransportError>;

    /// Close the session; the binding reports it as a requested disconnect
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Subscribe to a single topic filter
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Drop a subscription
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Hand a serialized payload to the network
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<MessageId, TransportError>;

    /// Run one iteration of the network loop, bounded by `timeout`
    ///
    /// Returns `Ok(None)` when nothing of interest happened within the window.
    async fn service(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError>;
}
