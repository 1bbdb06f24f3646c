//! Handshake integration test harness
//!
//! Provides:
//! - `FakeEngine`, a scripted engine that records what it is given
//! - in-memory signaling channel pairs
//! - helpers to build candidates and negotiators
//!
//! Each test binary compiles this module separately, so not every helper is
//! used everywhere.

#![allow(dead_code)]

pub mod fake_engine;

use std::sync::Arc;
use std::time::Duration;

use handshake_signaling::transport::{memory, RelayConnection};
use handshake_signaling::{
    IceCandidate, NegotiationOptions, Negotiator, Role, SignalingChannel,
};

pub use fake_engine::{Event, FakeEngine, Failure};

/// Initialize test logging (safe to call from every test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,handshake_signaling=debug")
        .with_test_writer()
        .try_init();
}

/// A host candidate with a distinct port per index
pub fn candidate(index: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!(
            "candidate:{} 1 udp 2130706431 192.168.1.10 {} typ host",
            index,
            50000 + index
        ),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// Two signaling channels connected back to back
pub fn channel_pair() -> (Arc<SignalingChannel>, Arc<SignalingChannel>) {
    let (a, b) = memory::pair();
    (
        Arc::new(SignalingChannel::new(a)),
        Arc::new(SignalingChannel::new(b)),
    )
}

/// A signaling channel and the raw connection on the other side of it
pub fn channel_with_raw_peer() -> (Arc<SignalingChannel>, RelayConnection) {
    let (a, b) = memory::pair();
    (Arc::new(SignalingChannel::new(a)), b)
}

/// Options with a bound that keeps a broken test from hanging
pub fn test_options() -> NegotiationOptions {
    NegotiationOptions {
        handshake_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    }
}

pub fn negotiator(
    role: Role,
    engine: &Arc<FakeEngine>,
    channel: &Arc<SignalingChannel>,
    options: NegotiationOptions,
) -> Negotiator<FakeEngine> {
    Negotiator::new(role, Arc::clone(engine), Arc::clone(channel), options)
}
