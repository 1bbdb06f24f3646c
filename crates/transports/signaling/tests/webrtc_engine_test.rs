//! Handshake between two webrtc-rs peer connections in one process
//!
//! Uses the local preset (no STUN), so only host candidates are gathered.

mod harness;

use std::sync::Arc;

use handshake_signaling::{
    GatheringPolicy, HandshakeConfig, NegotiationOptions, Negotiator, Role, SdpKind,
    WebRtcEngine,
};
use harness::{channel_pair, init_logging};
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;

async fn run_pair(config: HandshakeConfig) {
    let (a, b) = channel_pair();
    let initiator_engine = Arc::new(WebRtcEngine::new(&config).await.unwrap());
    let receiver_engine = Arc::new(WebRtcEngine::new(&config).await.unwrap());

    let options = NegotiationOptions::from(&config);
    let mut initiator = Negotiator::new(
        Role::Initiator,
        Arc::clone(&initiator_engine),
        Arc::clone(&a),
        options.clone(),
    );
    let mut receiver = Negotiator::new(
        Role::Receiver,
        Arc::clone(&receiver_engine),
        Arc::clone(&b),
        options,
    );

    let (initiator_pair, receiver_pair) = tokio::join!(initiator.run(), receiver.run());
    let initiator_pair = initiator_pair.unwrap();
    let receiver_pair = receiver_pair.unwrap();

    assert_eq!(initiator_pair.local(), receiver_pair.remote());
    assert_eq!(initiator_pair.remote(), receiver_pair.local());
    assert_eq!(initiator_pair.offer().kind, SdpKind::Offer);
    assert_eq!(initiator_pair.answer().kind, SdpKind::Answer);

    // The configured data channel puts an application section in the offer
    assert!(initiator_pair.offer().sdp.contains("m=application"));
    let label = initiator.engine().data_channel().map(|dc| dc.label().to_string());
    assert_eq!(label, config.data_channel_label);

    assert_eq!(initiator.role(), Role::Initiator);
    assert_ne!(initiator.id(), receiver.id());
    assert!(Arc::ptr_eq(receiver.channel(), &b));

    let applied = receiver
        .engine()
        .peer_connection()
        .remote_description()
        .await
        .expect("receiver applied the offer");
    assert_eq!(applied.sdp_type, RTCSdpType::Offer);

    initiator_engine.close().await.unwrap();
    receiver_engine.close().await.unwrap();
}

#[tokio::test]
async fn test_webrtc_trickle_handshake() {
    init_logging();
    run_pair(HandshakeConfig::local_preset()).await;
}

#[tokio::test]
async fn test_webrtc_complete_gathering_handshake() {
    init_logging();
    run_pair(HandshakeConfig::local_preset().with_gathering(GatheringPolicy::Complete)).await;
}
