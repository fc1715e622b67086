//! Configuration loading and validation tests
//!
//! Tests focus on observable outcomes of loading a unit's TOML file.

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use unitlink::config::{ConfigError, UnitConfig};

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[unit]
id = "b8:27:eb:12:34:56"

[mqtt]
broker_url = "mqtts://broker.example.org:8883"
username_env = "MQTT_USER"
password_env = "MQTT_PASS"
keepalive_secs = 30
qos = 1
connect_timeout_ms = 5000

[topics]
base = "1R1/014"
kind = "shutter"

[link]
max_backoff_secs = 120

[sensor]
interval_secs = 10
"#,
    );

    let config = UnitConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.unit.id.as_deref(), Some("b8:27:eb:12:34:56"));
    assert_eq!(config.mqtt.broker_url, "mqtts://broker.example.org:8883");
    assert_eq!(config.mqtt.username_env.as_deref(), Some("MQTT_USER"));
    assert_eq!(config.mqtt.keepalive_secs, 30);
    assert_eq!(config.mqtt.qos, 1);
    assert_eq!(config.mqtt.connect_timeout_ms, 5000);
    assert_eq!(config.topics.publish_topic(), "1R1/014/shutter");
    assert_eq!(config.topics.subscriptions(), vec!["1R1/014/shutter/command"]);
    assert_eq!(config.link.max_backoff_secs, 120);
    assert_eq!(config.link.service_timeout_ms, 2000);
    assert_eq!(config.sensor.interval_secs, 10);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "mqtt://localhost"

[topics]
base = "room"
kind = "temp"
"#,
    );

    let config = UnitConfig::load_from_file(temp_file.path()).unwrap();
    assert!(config.unit.id.is_none());
    assert_eq!(config.mqtt.keepalive_secs, 60);
    assert_eq!(config.mqtt.qos, 0);
    assert_eq!(config.mqtt.connect_timeout_ms, 10_000);

    let options = config.link_options();
    assert!(options.identity.is_none());
    assert_eq!(options.topics, vec!["room/temp/command"]);
    assert_eq!(options.reconnect.max_delay, Duration::from_secs(300));
}

#[test]
fn test_explicit_subscriptions() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "mqtt://localhost"

[topics]
base = "room"
kind = "temp"
subscribe = ["room/temp", "room/+/command"]
"#,
    );

    let config = UnitConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.link_options().topics,
        vec!["room/temp", "room/+/command"]
    );
}

#[test]
fn test_missing_file_is_reported() {
    let result = UnitConfig::load_from_file(std::path::Path::new("/nonexistent/unitlink.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_reported() {
    let temp_file = write_config("[mqtt\nbroker_url = ");
    let result = UnitConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_required_section_is_reported() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "mqtt://localhost"
"#,
    );
    let result = UnitConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_unit_id_is_rejected() {
    let temp_file = write_config(
        r#"
[unit]
id = "room/unit"

[mqtt]
broker_url = "mqtt://localhost"

[topics]
base = "room"
kind = "temp"
"#,
    );
    let result = UnitConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidUnitId(_))));
}

#[test]
fn test_invalid_qos_is_rejected() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "mqtt://localhost"
qos = 3

[topics]
base = "room"
kind = "temp"
"#,
    );
    let result = UnitConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_round_trips_through_show() {
    let temp_file = write_config(
        r#"
[unit]
id = "unit-1"

[mqtt]
broker_url = "mqtt://localhost:1883"

[topics]
base = "room"
kind = "temp"
"#,
    );
    let config = UnitConfig::load_from_file(temp_file.path()).unwrap();

    let shown = toml::to_string_pretty(&config).unwrap();
    let reparsed = UnitConfig::from_toml(&shown).unwrap();
    assert_eq!(reparsed, config);
}
