//! Application hooks invoked by the connection manager

use super::handle::LinkHandle;
use crate::protocol::Payload;
use async_trait::async_trait;

/// Override points of a unit built on the link
///
/// All hooks run on the manager task, in order with transport events. A hook
/// that needs to do slow work should spawn it.
#[async_trait]
pub trait LinkHooks: Send + 'static {
    /// Called once before the first connect
    async fn load(&mut self, _link: &LinkHandle) {}

    /// Called for each inbound payload addressed to this unit
    async fn handle_message(&mut self, _link: &LinkHandle, _topic: &str, _payload: &Payload) {}

    /// Called once after the service loop exits, before teardown
    async fn quit(&mut self) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LinkHooks for NoopHooks {}
