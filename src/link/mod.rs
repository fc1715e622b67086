//! Connection lifecycle management
//!
//! A [`ConnectionManager`] owns a [`Transport`](crate::transport::Transport),
//! keeps the broker session alive across disconnects, filters inbound payloads
//! by destination and hands them to the unit's [`LinkHooks`].

pub mod backoff;
pub mod handle;
pub mod hooks;
pub mod manager;
pub mod shutdown;
pub mod state;

pub use backoff::{Backoff, ReconnectConfig};
pub use handle::{LinkHandle, LinkStats, Outbound};
pub use hooks::{LinkHooks, NoopHooks};
pub use manager::ConnectionManager;
pub use shutdown::Shutdown;
pub use state::{SessionEvent, SessionState};

use std::time::Duration;

/// Construction options for a [`ConnectionManager`]
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Topic filters subscribed on every connect; must not be empty
    pub topics: Vec<String>,
    /// Value of `unitID` on outgoing payloads and of the accepted `dest`
    pub identity: Option<String>,
    /// Shared shutdown signal; a private one is created when unset
    pub shutdown: Option<Shutdown>,
    /// Bound on one network loop iteration
    pub service_timeout: Duration,
    /// Pause after a transient network loop error
    pub error_sleep: Duration,
    pub reconnect: ReconnectConfig,
    /// Publishes that may wait for the manager task
    pub outbound_capacity: usize,
}

impl LinkOptions {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            identity: None,
            shutdown: None,
            service_timeout: Duration::from_secs(2),
            error_sleep: Duration::from_secs(2),
            reconnect: ReconnectConfig::default(),
            outbound_capacity: 64,
        }
    }

    pub fn with_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = timeout;
        self
    }

    pub fn with_error_sleep(mut self, sleep: Duration) -> Self {
        self.error_sleep = sleep;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }
}
