//! Configuration system for the unit agent
//!
//! The agent is configured from a single TOML file. Broker credentials are never
//! stored in the file; it names the environment variables that hold them.

use crate::link::{LinkOptions, ReconnectConfig};
use crate::protocol::TopicBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitConfig {
    #[serde(default)]
    pub unit: UnitSection,
    pub mqtt: MqttSection,
    pub topics: TopicsSection,
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub sensor: SensorSection,
}

/// Unit identity section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnitSection {
    /// Unit identifier used as `unitID` and as the destination filter
    pub id: Option<String>,
}

/// MQTT broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Keepalive interval in seconds (default: 60)
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    /// Quality of service for publish and subscribe (default: 0, fire-and-forget)
    #[serde(default)]
    pub qos: u8,
    /// Bound on waiting for the broker to acknowledge a session (default: 10000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_keepalive() -> u64 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Topic layout: `base/kind` for data, `base/kind/command` for orders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    pub base: String,
    pub kind: String,
    /// Topic filters to subscribe to; defaults to the command topic
    #[serde(default)]
    pub subscribe: Vec<String>,
}

impl TopicsSection {
    /// Topic the unit publishes its data on
    pub fn publish_topic(&self) -> String {
        TopicBuilder::data_topic(&self.base, &self.kind)
    }

    /// Topic filters the link subscribes to on every connect
    pub fn subscriptions(&self) -> Vec<String> {
        if self.subscribe.is_empty() {
            vec![TopicBuilder::command_topic(&self.base, &self.kind)]
        } else {
            self.subscribe.clone()
        }
    }
}

/// Connection manager timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    #[serde(default = "default_service_timeout_ms")]
    pub service_timeout_ms: u64,
    #[serde(default = "default_error_sleep_ms")]
    pub error_sleep_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

fn default_service_timeout_ms() -> u64 {
    2000
}

fn default_error_sleep_ms() -> u64 {
    2000
}

fn default_max_jitter_ms() -> u64 {
    2000
}

fn default_min_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_outbound_capacity() -> usize {
    64
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            service_timeout_ms: default_service_timeout_ms(),
            error_sleep_ms: default_error_sleep_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

/// Sample sensor section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSection {
    /// Seconds between two measurements
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    5
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid unit ID format: {0}")]
    InvalidUnitId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl UnitConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: UnitConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(id) = &self.unit.id {
            validate_unit_id(id)?;
        }

        if self.mqtt.qos > 2 {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                self.mqtt.qos
            )));
        }

        if self.mqtt.keepalive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.keepalive_secs must be at least 5".to_string(),
            ));
        }

        if self.mqtt.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.topics.base.is_empty() || self.topics.kind.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "topics.base and topics.kind must not be empty".to_string(),
            ));
        }

        if self.topics.subscribe.iter().any(|t| t.is_empty()) {
            return Err(ConfigError::InvalidConfig(
                "topics.subscribe must not contain empty topics".to_string(),
            ));
        }

        if self.link.service_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "link.service_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.link.max_backoff_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "link.max_backoff_secs must be greater than 0".to_string(),
            ));
        }

        if self.link.outbound_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "link.outbound_capacity must be greater than 0".to_string(),
            ));
        }

        if self.sensor.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "sensor.interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the connection manager options described by this configuration
    pub fn link_options(&self) -> LinkOptions {
        let reconnect = ReconnectConfig {
            max_jitter: Duration::from_millis(self.link.max_jitter_ms),
            min_base: Duration::from_millis(self.link.min_backoff_ms),
            max_delay: Duration::from_secs(self.link.max_backoff_secs),
        };

        LinkOptions::new(self.topics.subscriptions())
            .with_identity(self.unit.id.clone())
            .with_service_timeout(Duration::from_millis(self.link.service_timeout_ms))
            .with_error_sleep(Duration::from_millis(self.link.error_sleep_ms))
            .with_reconnect(reconnect)
            .with_outbound_capacity(self.link.outbound_capacity)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[unit]
id = "unit-1"

[mqtt]
broker_url = "mqtt://localhost:1883"

[topics]
base = "1R1/014"
kind = "temperature"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate unit ID format: non-empty, no topic separators or wildcards
fn validate_unit_id(unit_id: &str) -> Result<(), ConfigError> {
    let valid_chars = unit_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'));

    if unit_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidUnitId(unit_id.to_string()));
    }

    Ok(())
}
