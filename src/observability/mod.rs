//! Observability for the unit agent
//!
//! Structured logging setup and span macros.

pub mod logging;

pub use logging::{init_logging, LogFormat};

pub use logging::{lifecycle_span, mqtt_span};
