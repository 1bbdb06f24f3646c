//! Two-party WebRTC signaling handshake
//!
//! This crate lets two peers establish a direct WebRTC connection by exchanging
//! session descriptions and ICE candidates through a relay.
//!
//! # Features
//!
//! - **Typed envelope codec**: `{"type": 1|2|3, "msg": "<base64>"}` frames
//! - **Per-role state machine**: initiator and receiver sequences with fail-fast errors
//! - **Trickle ICE**: local candidates forwarded as discovered, remote
//!   candidates buffered until the remote description is applied
//! - **Full ICE**: optional wait for gathering before sending the description
//! - **Transports**: WebSocket relay client plus an in-process pair for tests
//! - **Relay server**: minimal frame forwarder for running both peers locally
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Negotiator (one task, sequential states)              │
//! │  ├─ Engine (WebRtcEngine / test doubles)               │
//! │  │   └─ on_local_candidate ──► mpsc ──► CandidateRelay │
//! │  └─ SignalingChannel ◄────────────────────┘ (shared)   │
//! │      └─ RelayConnection (WebSocket / memory)           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use handshake_signaling::{GatheringPolicy, HandshakeConfig, Role};
//!
//! let role = Role::from_flags(true, false).unwrap();
//! let config = HandshakeConfig::default().with_gathering(GatheringPolicy::Complete);
//!
//! assert_eq!(role, Role::Initiator);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use handshake_signaling::{
//!     HandshakeConfig, Negotiator, Role, SignalingChannel, WebRtcEngine, WebSocketDialer,
//! };
//!
//! # async fn example() -> handshake_signaling::Result<()> {
//! let config = HandshakeConfig::default();
//! let channel = SignalingChannel::connect(&WebSocketDialer, &config.relay_url).await?;
//! let engine = WebRtcEngine::new(&config).await?;
//!
//! let mut negotiator = Negotiator::new(
//!     Role::Initiator,
//!     Arc::new(engine),
//!     Arc::new(channel),
//!     (&config).into(),
//! );
//! let outcome = negotiator.run().await?;
//! println!("answer: {}", outcome.answer().sdp);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod candidate;
pub mod channel;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod negotiation;
pub mod relay;
pub mod role;
pub mod transport;

pub use candidate::{CandidateRelay, RelayStats};
pub use channel::SignalingChannel;
pub use config::{GatheringPolicy, HandshakeConfig, TurnServerConfig, DEFAULT_RELAY_URL};
pub use engine::{ConnectionState, Engine, IceCandidate, SdpKind, SessionDescription, WebRtcEngine};
pub use envelope::{Envelope, MessageKind};
pub use error::{Error, Result};
pub use negotiation::{DescriptionPair, HandshakeState, NegotiationOptions, Negotiator};
pub use relay::{RelayHandle, RelayServer};
pub use role::Role;
pub use transport::{Dialer, RelayConnection, WebSocketDialer};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
