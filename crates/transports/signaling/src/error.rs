//! Error types for the signaling handshake

use std::time::Duration;

use crate::envelope::MessageKind;
use crate::negotiation::HandshakeState;

/// Result type alias using the handshake Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a signaling handshake
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter (including role selection)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Relay endpoint could not be reached
    #[error("Failed to dial relay: {0}")]
    DialFailed(String),

    /// Relay write failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Relay connection closed or reset while reading
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// Outer envelope structure could not be parsed
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope `type` outside the known message kinds
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(i64),

    /// Envelope payload does not decode under the schema of its kind
    #[error("Invalid payload for {kind:?}: {reason}")]
    InvalidPayloadForKind {
        /// Kind carried by the envelope
        kind: MessageKind,
        /// Decoder failure
        reason: String,
    },

    /// Peer sent a message kind that is not legal in the current state
    #[error("Unexpected {actual:?} in state {state:?}, expected {expected:?}")]
    UnexpectedMessageKind {
        /// State the handshake was in
        state: HandshakeState,
        /// Kind the state accepts
        expected: MessageKind,
        /// Kind that arrived
        actual: MessageKind,
    },

    /// Engine failed to produce a description
    #[error("Engine failed to create description: {0}")]
    EngineCreateFailed(String),

    /// Engine rejected a local or remote description
    #[error("Engine failed to apply description: {0}")]
    EngineApplyFailed(String),

    /// Peer did not answer within the configured bound
    #[error("Handshake timed out in state {state:?} after {after:?}")]
    HandshakeTimeout {
        /// State that was waiting
        state: HandshakeState,
        /// Configured bound
        after: Duration,
    },

    /// Local value could not be serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// API used out of sequence
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error came from the relay transport
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Error::DialFailed(_)
                | Error::TransportError(_)
                | Error::TransportClosed(_)
                | Error::IoError(_)
        )
    }

    /// Check if the remote peer violated the signaling protocol
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::MalformedEnvelope(_)
                | Error::UnknownMessageKind(_)
                | Error::InvalidPayloadForKind { .. }
                | Error::UnexpectedMessageKind { .. }
        )
    }

    /// Check if the connection-establishment engine failed
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            Error::EngineCreateFailed(_) | Error::EngineApplyFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");

        let err = Error::UnknownMessageKind(7);
        assert_eq!(err.to_string(), "Unknown message kind: 7");
    }

    #[test]
    fn test_unexpected_kind_display() {
        let err = Error::UnexpectedMessageKind {
            state: HandshakeState::AwaitOffer,
            expected: MessageKind::Offer,
            actual: MessageKind::Answer,
        };
        assert_eq!(
            err.to_string(),
            "Unexpected Answer in state AwaitOffer, expected Offer"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::InvalidConfig("x".into()).is_config_error());
        assert!(!Error::TransportClosed("x".into()).is_config_error());

        assert!(Error::TransportClosed("x".into()).is_transport_error());
        assert!(Error::DialFailed("x".into()).is_transport_error());
        assert!(!Error::MalformedEnvelope("x".into()).is_transport_error());

        assert!(Error::MalformedEnvelope("x".into()).is_protocol_violation());
        assert!(Error::UnknownMessageKind(0).is_protocol_violation());
        assert!(Error::InvalidPayloadForKind {
            kind: MessageKind::Candidate,
            reason: "x".into(),
        }
        .is_protocol_violation());
        assert!(!Error::EngineApplyFailed("x".into()).is_protocol_violation());

        assert!(Error::EngineCreateFailed("x".into()).is_engine_error());
        assert!(Error::EngineApplyFailed("x".into()).is_engine_error());
        assert!(!Error::SerializationError("x".into()).is_engine_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
        assert!(err.is_transport_error());
    }
}
