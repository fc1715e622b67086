//! unitlink - connection lifecycle manager for MQTT device units
//!
//! A device unit publishes JSON measurements and receives JSON commands through
//! an MQTT broker. This crate keeps that broker session alive:
//!
//! - connects, subscribes on every (re)connect, and reconnects with jittered
//!   exponential backoff after unexpected disconnects
//! - tags outgoing payloads with the unit's `unitID`
//! - drops inbound payloads addressed to other units via their `dest` field
//! - shuts down cooperatively on a shared signal
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use unitlink::link::{ConnectionManager, LinkOptions, NoopHooks};
//! use unitlink::testing::MockTransport;
//! use serde_json::json;
//!
//! # async fn demo() -> unitlink::LinkResult<()> {
//! let (transport, _broker) = MockTransport::new();
//! let options = LinkOptions::new(["room/temp"]).with_identity(Some("unit-1".to_string()));
//! let manager = ConnectionManager::new(transport, NoopHooks, options)?;
//! let link = manager.handle();
//! let task = manager.start();
//!
//! if link.wait_until_connected(std::time::Duration::from_secs(5)).await {
//!     let payload = json!({"value": 21.5}).as_object().cloned().unwrap_or_default();
//!     let _ = link.send_message("room/temp", payload);
//! }
//!
//! link.shutdown();
//! let _ = task.await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod link;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, UnitConfig};
pub use error::{LinkError, LinkResult, PublishError};
pub use link::{ConnectionManager, LinkHandle, LinkHooks, LinkOptions, Shutdown};
pub use protocol::Payload;
pub use transport::mqtt::MqttClient;
pub use transport::{Transport, TransportError, TransportEvent};
