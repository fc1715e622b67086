//! MQTT binding for the connection manager
//!
//! - [`connection`] - pure option building from the `[mqtt]` config section
//! - [`client`] - the [`Transport`](crate::transport::Transport) implementation
//!
//! ```rust,no_run
//! use unitlink::config::MqttSection;
//! use unitlink::transport::mqtt::MqttClient;
//!
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//!     keepalive_secs: 60,
//!     qos: 0,
//!     connect_timeout_ms: 10_000,
//! };
//!
//! let client = MqttClient::new("unit-1", &config)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod connection;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, qos_from_level, unique_client_id, MqttError};
