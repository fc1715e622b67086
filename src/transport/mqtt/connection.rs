//! Broker connection options for the MQTT binding
//!
//! Pure functions turning the `[mqtt]` configuration section into rumqttc
//! options.

use crate::config::MqttSection;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Largest packet accepted from the broker
const MAX_PACKET_SIZE: u32 = 64 * 1024;

/// Errors building the MQTT binding
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Unsupported broker URL scheme: {0} (expected mqtt or mqtts)")]
    UnsupportedScheme(String),
    #[error("Invalid QoS level: {0}")]
    InvalidQos(u8),
}

/// Map a configured QoS level to rumqttc's QoS
pub fn qos_from_level(level: u8) -> Result<QoS, MqttError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::InvalidQos(other)),
    }
}

/// Client id unique to this process, so two devices never take over each
/// other's broker session
pub fn unique_client_id(label: &str) -> String {
    format!("{label}-{}", Uuid::new_v4())
}

/// Build rumqttc options from config
pub fn configure_mqtt_options(
    client_label: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let tls = match url.scheme() {
        "mqtt" => false,
        "mqtts" => true,
        other => return Err(MqttError::UnsupportedScheme(other.to_string())),
    };

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(unique_client_id(client_label), host, port);

    if tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    // Credentials come from the environment, never from the file
    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(username, password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keepalive_secs));
    mqtt_options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    Ok(mqtt_options)
}
