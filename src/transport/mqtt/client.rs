//! MQTT transport built on rumqttc
//!
//! The rumqttc event loop is driven directly by [`Transport::service`], so all
//! network activity happens on the connection manager's task. Client requests
//! use the non-blocking `try_*` calls since the event loop is not being polled
//! while they are issued.

use super::connection::{configure_mqtt_options, qos_from_level, MqttError};
use crate::config::MqttSection;
use crate::transport::{MessageId, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ConnectionError, Event, EventLoop};
use rumqttc::Outgoing;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// Requests that may be queued between two polls of the event loop
const REQUEST_CAPACITY: usize = 64;

/// MQTT binding for the connection manager
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
    qos: QoS,
    connect_timeout: Duration,
    session_up: bool,
    disconnect_requested: bool,
    pending: VecDeque<TransportEvent>,
    next_mid: MessageId,
}

impl MqttClient {
    /// Create the binding; no network traffic happens until `connect`
    pub fn new(client_label: &str, config: &MqttSection) -> Result<Self, MqttError> {
        let options = configure_mqtt_options(client_label, config)?;
        let qos = qos_from_level(config.qos)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Ok(Self {
            client,
            event_loop,
            qos,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            session_up: false,
            disconnect_requested: false,
            pending: VecDeque::new(),
            next_mid: 0,
        })
    }

    /// Poll the event loop until the broker acknowledges the session
    async fn wait_for_connack(&mut self) -> Result<(), TransportError> {
        let timeout = self.connect_timeout;
        let event_loop = &mut self.event_loop;

        let result = tokio::time::timeout(timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(other) => debug!("Ignoring event before ConnAck: {:?}", other),
                    Err(ConnectionError::ConnectionRefused(code)) => {
                        return Err(TransportError::Connect(format!(
                            "broker refused connection: {code:?}"
                        )));
                    }
                    Err(e) => return Err(TransportError::Connect(e.to_string())),
                }
            }
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Broker acknowledged session");
                self.session_up = true;
                self.disconnect_requested = false;
                self.pending.push_back(TransportEvent::ConnAck);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::ConnectTimeout(timeout)),
        }
    }

    /// Translate a rumqttc event into a transport event, updating session flags
    fn translate(&mut self, event: Event) -> Option<TransportEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                self.session_up = true;
                self.disconnect_requested = false;
                Some(TransportEvent::ConnAck)
            }
            Event::Incoming(Packet::Publish(publish)) => Some(TransportEvent::Message {
                topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                payload: publish.payload,
            }),
            Event::Incoming(Packet::SubAck(suback)) => {
                Some(TransportEvent::SubAck { pkid: suback.pkid })
            }
            Event::Incoming(Packet::Disconnect(disconnect)) => {
                debug!("Broker sent disconnect: {:?}", disconnect.reason_code);
                Some(self.session_closed())
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => Some(TransportEvent::Published { pkid }),
            Event::Outgoing(Outgoing::Disconnect) => Some(self.session_closed()),
            _ => None,
        }
    }

    fn session_closed(&mut self) -> TransportEvent {
        self.session_up = false;
        TransportEvent::Disconnected {
            requested: std::mem::take(&mut self.disconnect_requested),
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.wait_for_connack().await
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        // rumqttc re-dials on the next poll after a connection error
        self.session_up = false;
        self.pending.clear();
        self.wait_for_connack().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.session_up {
            return Ok(());
        }

        self.disconnect_requested = true;
        self.client
            .try_disconnect()
            .map_err(|e| TransportError::Disconnect(e.to_string()))?;

        // Flush the DISCONNECT packet onto the wire
        let timeout = self.connect_timeout;
        let event_loop = &mut self.event_loop;
        let flushed = tokio::time::timeout(timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;

        if flushed.is_err() {
            debug!("Disconnect not flushed within {:?}", timeout);
        }

        let event = self.session_closed();
        self.pending.push_back(event);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, self.qos)
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| TransportError::Unsubscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<MessageId, TransportError> {
        self.client
            .try_publish(topic, self.qos, false, payload)
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        self.next_mid = self.next_mid.wrapping_add(1);
        Ok(self.next_mid)
    }

    async fn service(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        let polled = match tokio::time::timeout(timeout, self.event_loop.poll()).await {
            Ok(polled) => polled,
            Err(_) => return Ok(None),
        };

        match polled {
            Ok(event) => Ok(self.translate(event)),
            // A live session that errors out has been lost
            Err(e) if self.session_up => {
                debug!("Event loop error on live session: {}", e);
                Ok(Some(self.session_closed()))
            }
            Err(ConnectionError::ConnectionRefused(code)) => Ok(Some(
                TransportEvent::ConnectFailed(format!("broker refused connection: {code:?}")),
            )),
            Err(e) => Err(TransportError::Service(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, ConnectReturnCode, Disconnect, DisconnectReasonCode, Publish, SubAck,
    };

    fn test_client() -> MqttClient {
        let config = MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            keepalive_secs: 60,
            qos: 1,
            connect_timeout_ms: 250,
        };
        MqttClient::new("unit-1", &config).unwrap()
    }

    fn connack() -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }))
    }

    #[tokio::test]
    async fn test_new_maps_qos() {
        let client = test_client();
        assert_eq!(client.qos, QoS::AtLeastOnce);
        assert_eq!(client.connect_timeout, Duration::from_millis(250));
        assert!(!client.session_up);
    }

    #[tokio::test]
    async fn test_invalid_qos_rejected() {
        let config = MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            keepalive_secs: 60,
            qos: 5,
            connect_timeout_ms: 10_000,
        };
        assert!(matches!(
            MqttClient::new("unit-1", &config),
            Err(MqttError::InvalidQos(5))
        ));
    }

    #[tokio::test]
    async fn test_translate_connack_opens_session() {
        let mut client = test_client();
        assert_eq!(client.translate(connack()), Some(TransportEvent::ConnAck));
        assert!(client.session_up);
    }

    #[tokio::test]
    async fn test_translate_publish() {
        let mut client = test_client();
        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: Bytes::from("room/temp"),
            pkid: 0,
            payload: Bytes::from(r#"{"dest":"all"}"#),
            properties: None,
        }));

        assert_eq!(
            client.translate(publish),
            Some(TransportEvent::Message {
                topic: "room/temp".to_string(),
                payload: Bytes::from(r#"{"dest":"all"}"#),
            })
        );
    }

    #[tokio::test]
    async fn test_translate_acks() {
        let mut client = test_client();
        let suback = Event::Incoming(Packet::SubAck(SubAck {
            pkid: 7,
            return_codes: vec![],
            properties: None,
        }));
        assert_eq!(
            client.translate(suback),
            Some(TransportEvent::SubAck { pkid: 7 })
        );
        assert_eq!(
            client.translate(Event::Outgoing(Outgoing::Publish(3))),
            Some(TransportEvent::Published { pkid: 3 })
        );
        assert_eq!(client.translate(Event::Outgoing(Outgoing::PingReq)), None);
    }

    #[tokio::test]
    async fn test_broker_disconnect_is_unexpected() {
        let mut client = test_client();
        client.translate(connack());

        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert_eq!(
            client.translate(disconnect),
            Some(TransportEvent::Disconnected { requested: false })
        );
        assert!(!client.session_up);
    }

    #[tokio::test]
    async fn test_local_disconnect_is_requested() {
        let mut client = test_client();
        client.translate(connack());
        client.disconnect_requested = true;

        assert_eq!(
            client.translate(Event::Outgoing(Outgoing::Disconnect)),
            Some(TransportEvent::Disconnected { requested: true })
        );
        assert!(!client.disconnect_requested);
    }

    #[tokio::test]
    async fn test_service_drains_pending_first() {
        let mut client = test_client();
        client.pending.push_back(TransportEvent::ConnAck);
        let event = client.service(Duration::from_millis(10)).await.unwrap();
        assert_eq!(event, Some(TransportEvent::ConnAck));
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let mut client = test_client();
        assert!(client.disconnect().await.is_ok());
        assert!(client.pending.is_empty());
    }
}
