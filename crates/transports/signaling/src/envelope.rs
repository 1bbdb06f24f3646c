//! Wire envelope exchanged through the relay
//!
//! Every relay frame carries exactly one envelope:
//!
//! ```text
//! { "type": 1 | 2 | 3, "msg": "<base64 of the inner payload>" }
//! ```
//!
//! The inner payload is the engine-native JSON of a session description
//! (`Offer`, `Answer`) or of an ICE candidate (`Candidate`). The codec only
//! checks the outer structure; inner decoding happens when the consumer asks
//! for a typed value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::engine::{IceCandidate, SdpKind, SessionDescription};
use crate::{Error, Result};

/// Kind of a signaling message. Ordinals are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// SDP offer from the initiator
    Offer = 1,
    /// SDP answer from the receiver
    Answer = 2,
    /// Trickled ICE candidate from either side
    Candidate = 3,
}

impl MessageKind {
    /// Wire ordinal
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    fn for_description(kind: SdpKind) -> Option<Self> {
        match kind {
            SdpKind::Offer => Some(MessageKind::Offer),
            SdpKind::Answer => Some(MessageKind::Answer),
            SdpKind::Pranswer => None,
        }
    }
}

impl TryFrom<i64> for MessageKind {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(MessageKind::Offer),
            2 => Ok(MessageKind::Answer),
            3 => Ok(MessageKind::Candidate),
            other => Err(Error::UnknownMessageKind(other)),
        }
    }
}

#[derive(Serialize)]
struct WireOut {
    #[serde(rename = "type")]
    kind: u8,
    msg: String,
}

#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "type")]
    kind: i64,
    msg: String,
}

/// A decoded signaling message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Message kind selecting the payload decoder
    pub kind: MessageKind,
    /// Opaque inner payload
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope from an already serialized payload
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Wrap a session description. The envelope kind follows the description
    /// kind assigned by the engine.
    pub fn description(description: &SessionDescription) -> Result<Self> {
        let kind = MessageKind::for_description(description.kind).ok_or_else(|| {
            Error::SerializationError(format!(
                "{:?} descriptions are not exchanged by this protocol",
                description.kind
            ))
        })?;
        let payload = serde_json::to_vec(description).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize description: {}", e))
        })?;
        Ok(Self { kind, payload })
    }

    /// Wrap an ICE candidate
    pub fn candidate(candidate: &IceCandidate) -> Result<Self> {
        let payload = serde_json::to_vec(candidate).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize candidate: {}", e))
        })?;
        Ok(Self {
            kind: MessageKind::Candidate,
            payload,
        })
    }

    /// Decode the payload as a session description.
    ///
    /// The description's own kind tag must agree with the envelope kind.
    pub fn to_description(&self) -> Result<SessionDescription> {
        let description: SessionDescription =
            serde_json::from_slice(&self.payload).map_err(|e| Error::InvalidPayloadForKind {
                kind: self.kind,
                reason: e.to_string(),
            })?;

        if MessageKind::for_description(description.kind) != Some(self.kind) {
            return Err(Error::InvalidPayloadForKind {
                kind: self.kind,
                reason: format!("payload carries a {:?} description", description.kind),
            });
        }

        Ok(description)
    }

    /// Decode the payload as an ICE candidate
    pub fn to_candidate(&self) -> Result<IceCandidate> {
        if self.kind != MessageKind::Candidate {
            return Err(Error::InvalidPayloadForKind {
                kind: self.kind,
                reason: "not a candidate envelope".to_string(),
            });
        }

        serde_json::from_slice(&self.payload).map_err(|e| Error::InvalidPayloadForKind {
            kind: self.kind,
            reason: e.to_string(),
        })
    }

    /// Serialize into a relay frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self.kind, &self.payload)
    }
}

/// Serialize a kind and payload into the wire envelope form
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>> {
    let wire = WireOut {
        kind: kind.ordinal(),
        msg: STANDARD.encode(payload),
    };

    serde_json::to_vec(&wire)
        .map_err(|e| Error::SerializationError(format!("Failed to serialize envelope: {}", e)))
}

/// Parse a relay frame into an envelope.
///
/// Fails with `MalformedEnvelope` when the outer structure is not an envelope
/// and with `UnknownMessageKind` when `type` is not a known kind.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let wire: WireIn = serde_json::from_slice(bytes)
        .map_err(|e| Error::MalformedEnvelope(format!("Invalid envelope JSON: {}", e)))?;

    let payload = STANDARD
        .decode(wire.msg.as_bytes())
        .map_err(|e| Error::MalformedEnvelope(format!("Invalid payload encoding: {}", e)))?;

    let kind = MessageKind::try_from(wire.kind)?;

    Ok(Envelope { kind, payload })
}
