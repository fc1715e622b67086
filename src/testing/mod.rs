//! Testing utilities
//!
//! Scripted transport and recording hooks so the connection manager can be
//! exercised without a broker.

pub mod mocks;

pub use mocks::*;
