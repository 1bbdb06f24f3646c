//! webrtc-rs backed engine

use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use super::{
    CandidateHandler, ConnectionState, Engine, IceCandidate, SdpKind, SessionDescription,
    StateChangeHandler,
};
use crate::config::HandshakeConfig;
use crate::{Error, Result};

/// Engine backed by a single webrtc-rs `RTCPeerConnection`
pub struct WebRtcEngine {
    peer_connection: Arc<RTCPeerConnection>,

    /// Negotiated data channel, retained so the offer carries an
    /// application m-line
    data_channel: Option<Arc<RTCDataChannel>>,
}

impl WebRtcEngine {
    /// Create a peer connection configured with the STUN/TURN servers of
    /// `config`.
    #[instrument(skip(config))]
    pub async fn new(config: &HandshakeConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::EngineCreateFailed(format!("Failed to register codecs: {}", e)))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| {
                Error::EngineCreateFailed(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        info!(
            stun_servers = config.stun_servers.len(),
            turn_servers = config.turn_servers.len(),
            "Creating peer connection"
        );

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                Error::EngineCreateFailed(format!("Failed to create peer connection: {}", e))
            })?,
        );

        let data_channel = match &config.data_channel_label {
            Some(label) => {
                let channel = peer_connection
                    .create_data_channel(label, None)
                    .await
                    .map_err(|e| {
                        Error::EngineCreateFailed(format!(
                            "Failed to create data channel '{}': {}",
                            label, e
                        ))
                    })?;
                debug!(label = %label, "Data channel created");
                Some(channel)
            }
            None => None,
        };

        Ok(Self {
            peer_connection,
            data_channel,
        })
    }

    /// Underlying peer connection for advanced usage
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    /// Negotiated data channel, if one was configured
    pub fn data_channel(&self) -> Option<&Arc<RTCDataChannel>> {
        self.data_channel.as_ref()
    }

    /// Close the peer connection
    pub async fn close(&self) -> Result<()> {
        info!("Closing peer connection");
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("Failed to close peer connection: {}", e)))
    }
}

fn to_rtc(description: SessionDescription) -> anyhow::Result<RTCSessionDescription> {
    let parsed = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp),
    };
    parsed.context("Failed to parse SDP")
}

fn from_rtc(description: RTCSessionDescription) -> anyhow::Result<SessionDescription> {
    let kind = match description.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        other => bail!("Unsupported description type {:?}", other),
    };
    Ok(SessionDescription {
        kind,
        sdp: description.sdp,
    })
}

fn candidate_from_rtc(candidate: &RTCIceCandidate) -> Option<IceCandidate> {
    match candidate.to_json() {
        Ok(init) => Some(IceCandidate {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }),
        Err(e) => {
            warn!("Dropping local candidate that failed to serialize: {}", e);
            None
        }
    }
}

fn state_from_rtc(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        _ => None,
    }
}

#[async_trait]
impl Engine for WebRtcEngine {
    async fn create_offer(&self) -> anyhow::Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        from_rtc(answer)
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> anyhow::Result<()> {
        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await
            .context("Failed to set local description")
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> anyhow::Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await
            .context("Failed to set remote description")
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.peer_connection.local_description().await?;
        from_rtc(description).ok()
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .context("Failed to add ICE candidate")
    }

    fn on_local_candidate(&self, handler: CandidateHandler) {
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                match candidate {
                    Some(c) => {
                        if let Some(candidate) = candidate_from_rtc(&c) {
                            handler(Some(candidate));
                        }
                    }
                    None => handler(None),
                }
                Box::pin(async {})
            }));
    }

    fn on_connection_state_change(&self, handler: StateChangeHandler) {
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                if let Some(state) = state_from_rtc(s) {
                    handler(state);
                }
                Box::pin(async {})
            }));
    }

    async fn gathering_complete(&self) {
        let mut done = self.peer_connection.gathering_complete_promise().await;
        let _ = done.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            state_from_rtc(RTCPeerConnectionState::Connected),
            Some(ConnectionState::Connected)
        );
        assert_eq!(
            state_from_rtc(RTCPeerConnectionState::Failed),
            Some(ConnectionState::Failed)
        );
        assert_eq!(state_from_rtc(RTCPeerConnectionState::Unspecified), None);
    }

    #[tokio::test]
    async fn test_offer_round_trips_through_engine_types() {
        let config = HandshakeConfig::local_preset();
        let engine = WebRtcEngine::new(&config).await.unwrap();

        let offer = engine.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.starts_with("v=0"));

        let rtc = to_rtc(offer.clone()).unwrap();
        assert_eq!(rtc.sdp_type, RTCSdpType::Offer);
        assert_eq!(from_rtc(rtc).unwrap(), offer);

        engine.close().await.unwrap();
    }

    #[test]
    fn test_invalid_sdp_is_rejected() {
        assert!(to_rtc(SessionDescription::offer("not sdp")).is_err());
    }
}
