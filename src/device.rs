//! Sample unit: a CPU temperature sensor
//!
//! Publishes `{"value": <celsius>, "value_units": "celsius", "unitID": ...}` on
//! the unit's data topic every interval, and logs the commands it receives.

use crate::link::{LinkHandle, LinkHooks};
use crate::protocol::Payload;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default thermal zone exposed by the kernel
pub const CPU_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Sensor read errors
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unexpected sensor reading: {0:?}")]
    Parse(String),
}

/// Read a sysfs temperature in degrees Celsius, rounded to 0.01
pub async fn read_cpu_temperature(path: &Path) -> Result<f64, SensorError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SensorError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let millidegrees: i64 = raw
        .trim()
        .parse()
        .map_err(|_| SensorError::Parse(raw.trim().to_string()))?;

    Ok((millidegrees as f64 / 10.0).round() / 100.0)
}

/// Build the measurement payload
pub fn measurement_payload(celsius: f64) -> Payload {
    let mut payload = Payload::new();
    payload.insert("value".to_string(), json!(celsius));
    payload.insert(
        "value_units".to_string(),
        Value::String("celsius".to_string()),
    );
    payload
}

/// Hooks publishing periodic temperature readings
pub struct SensorHooks {
    topic: String,
    interval: Duration,
    source: PathBuf,
    task: Option<JoinHandle<()>>,
}

impl SensorHooks {
    pub fn new(topic: impl Into<String>, interval: Duration) -> Self {
        Self {
            topic: topic.into(),
            interval,
            source: PathBuf::from(CPU_THERMAL_ZONE),
            task: None,
        }
    }

    /// Read temperatures from another file
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }
}

async fn publish_measurements(link: LinkHandle, topic: String, source: PathBuf, interval: Duration) {
    let shutdown = link.shutdown_signal().clone();

    loop {
        if link.is_connected() {
            match read_cpu_temperature(&source).await {
                Ok(celsius) => {
                    debug!(topic = %topic, celsius, "Publishing measurement");
                    // Failures are already logged by the handle
                    let _ = link.send_message(&topic, measurement_payload(celsius));
                }
                Err(e) => warn!(error = %e, "Sensor read failed"),
            }
        }

        if !shutdown.sleep(interval).await {
            break;
        }
    }

    debug!("Measurement task stopped");
}

#[async_trait]
impl LinkHooks for SensorHooks {
    async fn load(&mut self, link: &LinkHandle) {
        info!(
            topic = %self.topic,
            interval_secs = self.interval.as_secs(),
            "Starting temperature measurements"
        );

        self.task = Some(tokio::spawn(publish_measurements(
            link.clone(),
            self.topic.clone(),
            self.source.clone(),
            self.interval,
        )));
    }

    async fn handle_message(&mut self, _link: &LinkHandle, topic: &str, payload: &Payload) {
        let body = Value::Object(payload.clone());
        info!(topic = %topic, payload = %body, "Command received");
    }

    async fn quit(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        info!("Temperature measurements stopped");
    }
}
