//! Crate-level error types
//!
//! Each concern has its own error enum; `LinkError` gathers the ones that can
//! stop the agent before or while it runs.

use crate::config::ConfigError;
use crate::protocol::EncodeError;
use crate::transport::mqtt::MqttError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors that stop the agent
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MQTT setup error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("Invalid link options: {0}")]
    InvalidOptions(String),
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Reasons a `send_message` call did not queue anything
#[derive(Debug, Error, PartialEq)]
pub enum PublishError {
    #[error("Publish while disconnected")]
    NotConnected,

    #[error("Missing identity: payload has no unitID and none is configured")]
    MissingIdentity,

    #[error("Payload serialization failed: {0}")]
    Serialization(String),

    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Link is stopped")]
    Stopped,
}

impl From<EncodeError> for PublishError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::MissingIdentity => PublishError::MissingIdentity,
            EncodeError::Serialization(reason) => PublishError::Serialization(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_maps_to_publish_error() {
        assert_eq!(
            PublishError::from(EncodeError::MissingIdentity),
            PublishError::MissingIdentity
        );
        assert_eq!(
            PublishError::from(EncodeError::Serialization("bad".to_string())),
            PublishError::Serialization("bad".to_string())
        );
    }

    #[test]
    fn test_link_error_from_transport() {
        let err: LinkError = TransportError::Fatal("socket closed".to_string()).into();
        assert!(matches!(err, LinkError::Transport(_)));
        assert_eq!(
            err.to_string(),
            "Transport error: Transport failed permanently: socket closed"
        );
    }
}
