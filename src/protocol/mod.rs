//! Wire protocol for the unit agent
//!
//! Payload encoding, destination filtering, and topic layout.

pub mod payload;
pub mod topics;

pub use payload::*;
pub use topics::*;
