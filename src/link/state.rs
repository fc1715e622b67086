//! Session state tracking
//!
//! Transitions are pure functions of the current state and a session event;
//! the manager publishes the result on a watch channel.

use tracing::{debug, info, warn};

/// Broker session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

/// Events that move the session between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connect or reconnect call is about to be issued
    ConnectStarted,
    /// Broker accepted the session
    ConnAck,
    /// Connect handshake failed
    ConnectFailed,
    /// Session ended, requested or not
    Disconnected,
}

/// Determine next state after a session event (pure function)
pub fn next_state(current: SessionState, event: SessionEvent) -> SessionState {
    match (current, event) {
        // A late connect attempt never downgrades a live session
        (SessionState::Connected, SessionEvent::ConnectStarted) => SessionState::Connected,
        (_, SessionEvent::ConnectStarted) => SessionState::Connecting,
        (_, SessionEvent::ConnAck) => SessionState::Connected,
        (_, SessionEvent::ConnectFailed) | (_, SessionEvent::Disconnected) => {
            SessionState::Disconnected
        }
    }
}

/// Log a session state transition
pub fn log_state_transition(from: SessionState, to: SessionState) {
    match (from, to) {
        (SessionState::Connecting, SessionState::Connected) => {
            info!("Broker session established");
        }
        (SessionState::Connected, SessionState::Disconnected) => {
            warn!("Broker session lost");
        }
        (SessionState::Connecting, SessionState::Disconnected) => {
            warn!("Broker session could not be established");
        }
        (from, to) if from == to => {}
        _ => {
            debug!("Session state: {:?} -> {:?}", from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_disconnected() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert!(!SessionState::default().is_connected());
    }

    #[test]
    fn test_connect_cycle() {
        let state = next_state(SessionState::Disconnected, SessionEvent::ConnectStarted);
        assert_eq!(state, SessionState::Connecting);
        assert!(!state.is_connected());

        let state = next_state(state, SessionEvent::ConnAck);
        assert!(state.is_connected());

        let state = next_state(state, SessionEvent::Disconnected);
        assert_eq!(state, SessionState::Disconnected);
    }

    #[test]
    fn test_connect_failure_returns_to_disconnected() {
        let state = next_state(SessionState::Connecting, SessionEvent::ConnectFailed);
        assert_eq!(state, SessionState::Disconnected);
    }

    #[test]
    fn test_connect_started_keeps_live_session() {
        assert_eq!(
            next_state(SessionState::Connected, SessionEvent::ConnectStarted),
            SessionState::Connected
        );
    }

    #[test]
    fn test_any_disconnect_clears_connected() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Connected,
        ] {
            assert!(!next_state(state, SessionEvent::Disconnected).is_connected());
        }
    }
}
