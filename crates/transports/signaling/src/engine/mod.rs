//! Connection-establishment engine seam
//!
//! The handshake never generates or interprets descriptions itself. It drives
//! an [`Engine`] that owns offer/answer generation, description validation,
//! ICE gathering and the secure transport. [`WebRtcEngine`] is the production
//! implementation over webrtc-rs.

mod peer_connection;

pub use peer_connection::WebRtcEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Description role assigned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Offer
    Offer,
    /// Answer
    Answer,
    /// Provisional answer
    Pranswer,
}

/// Session description as produced and consumed by the engine.
///
/// Serializes to the engine-native form `{"type": "offer", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer / answer tag
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// Raw SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the engine-native init form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// `candidate:` attribute value
    pub candidate: String,

    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    /// ICE ufrag the candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Peer connection state, surfaced for diagnostics only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet connecting
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Direct path established
    Connected,
    /// Path lost, may recover
    Disconnected,
    /// Connection failed
    Failed,
    /// Connection closed
    Closed,
}

/// Local candidate callback. `None` signals that gathering is complete.
pub type CandidateHandler = Box<dyn Fn(Option<IceCandidate>) + Send + Sync>;

/// Connection state callback
pub type StateChangeHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// Connection-establishment engine used by one handshake
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Produce a local offer
    async fn create_offer(&self) -> anyhow::Result<SessionDescription>;

    /// Produce a local answer to the applied remote offer
    async fn create_answer(&self) -> anyhow::Result<SessionDescription>;

    /// Apply a local description. Starts candidate gathering.
    async fn set_local_description(&self, description: SessionDescription)
        -> anyhow::Result<()>;

    /// Apply the remote peer's description
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> anyhow::Result<()>;

    /// Current local description, including any candidates gathered so far
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Add a candidate trickled by the remote peer
    async fn add_remote_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;

    /// Install the local candidate callback, replacing any previous one
    fn on_local_candidate(&self, handler: CandidateHandler);

    /// Install the connection state callback, replacing any previous one
    fn on_connection_state_change(&self, handler: StateChangeHandler);

    /// Resolve once local candidate gathering has finished
    async fn gathering_complete(&self);
}
