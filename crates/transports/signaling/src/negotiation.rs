//! Negotiation state machine
//!
//! Drives one handshake for one role:
//!
//! ```text
//! Initiator: CreateLocalOffer -> CommitLocalOffer -> SendOffer
//!            -> AwaitAnswer -> ApplyRemoteAnswer -> Complete
//!
//! Receiver:  AwaitOffer -> ApplyRemoteOffer -> CreateLocalAnswer
//!            -> CommitLocalAnswer -> SendAnswer -> Complete
//! ```
//!
//! The first fatal error moves the machine to `Failed` and is returned to the
//! caller. Candidates that reach an awaiting state before the remote
//! description are buffered and applied right after it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::candidate::{self, CandidateRelay, RelayStats};
use crate::channel::SignalingChannel;
use crate::config::{GatheringPolicy, HandshakeConfig};
use crate::engine::{Engine, IceCandidate, SessionDescription};
use crate::envelope::{Envelope, MessageKind};
use crate::role::Role;
use crate::{Error, Result};

/// Named states of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Not started
    Idle,
    /// Initiator asks the engine for an offer
    CreateLocalOffer,
    /// Initiator applies its own offer
    CommitLocalOffer,
    /// Initiator writes the offer to the relay
    SendOffer,
    /// Initiator waits for the answer
    AwaitAnswer,
    /// Initiator applies the remote answer
    ApplyRemoteAnswer,
    /// Receiver waits for the offer
    AwaitOffer,
    /// Receiver applies the remote offer
    ApplyRemoteOffer,
    /// Receiver asks the engine for an answer
    CreateLocalAnswer,
    /// Receiver applies its own answer
    CommitLocalAnswer,
    /// Receiver writes the answer to the relay
    SendAnswer,
    /// Descriptions exchanged and applied on this side
    Complete,
    /// A fatal error ended the handshake
    Failed,
}

/// Per-handshake tuning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationOptions {
    /// When the local description is sent relative to candidate gathering
    pub gathering: GatheringPolicy,
    /// Bound on waiting for the remote description (None = no bound)
    pub handshake_timeout: Option<Duration>,
}

impl From<&HandshakeConfig> for NegotiationOptions {
    fn from(config: &HandshakeConfig) -> Self {
        Self {
            gathering: config.gathering,
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

/// Outcome of a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionPair {
    role: Role,
    local: SessionDescription,
    remote: SessionDescription,
}

impl DescriptionPair {
    /// Role that produced this record
    pub fn role(&self) -> Role {
        self.role
    }

    /// Local description exactly as it was sent
    pub fn local(&self) -> &SessionDescription {
        &self.local
    }

    /// Remote description exactly as it was received
    pub fn remote(&self) -> &SessionDescription {
        &self.remote
    }

    /// The offer, whichever side produced it
    pub fn offer(&self) -> &SessionDescription {
        match self.role {
            Role::Initiator => &self.local,
            Role::Receiver => &self.remote,
        }
    }

    /// The answer, whichever side produced it
    pub fn answer(&self) -> &SessionDescription {
        match self.role {
            Role::Initiator => &self.remote,
            Role::Receiver => &self.local,
        }
    }
}

/// Runs one handshake over a signaling channel
pub struct Negotiator<E: Engine> {
    id: Uuid,
    role: Role,
    engine: Arc<E>,
    channel: Arc<SignalingChannel>,
    options: NegotiationOptions,
    state: HandshakeState,
    pending_candidates: Vec<IceCandidate>,
    relay: Option<CandidateRelay>,
}

impl<E: Engine> Negotiator<E> {
    /// Create a negotiator for `role`
    pub fn new(
        role: Role,
        engine: Arc<E>,
        channel: Arc<SignalingChannel>,
        options: NegotiationOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            engine,
            channel,
            options,
            state: HandshakeState::Idle,
            pending_candidates: Vec::new(),
            relay: None,
        }
    }

    /// Identifier attached to every log line of this handshake
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Side this negotiator plays
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Engine the descriptions are applied to
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Channel shared with the candidate relay
    pub fn channel(&self) -> &Arc<SignalingChannel> {
        &self.channel
    }

    /// Run the handshake to completion.
    ///
    /// A negotiator runs once; calling this again fails with
    /// [`Error::InvalidState`].
    #[instrument(skip(self), fields(handshake_id = %self.id, role = %self.role))]
    pub async fn run(&mut self) -> Result<DescriptionPair> {
        if self.state != HandshakeState::Idle {
            return Err(Error::InvalidState(format!(
                "handshake already ran (state {:?})",
                self.state
            )));
        }

        info!("Starting handshake");

        let result = match self.role {
            Role::Initiator => self.run_initiator().await,
            Role::Receiver => self.run_receiver().await,
        };

        match &result {
            Ok(_) => {
                self.enter(HandshakeState::Complete);
                info!("Handshake complete");
            }
            Err(e) => {
                error!(state = ?self.state, "Handshake failed: {}", e);
                self.state = HandshakeState::Failed;
                if let Some(relay) = self.relay.take() {
                    relay.abort();
                }
            }
        }

        result
    }

    /// Keep applying remote candidates after the handshake completed.
    ///
    /// Returns the number of candidates read once the relay connection
    /// closes. A description arriving here is a protocol violation.
    #[instrument(skip(self), fields(handshake_id = %self.id, role = %self.role))]
    pub async fn accept_remote_candidates(&mut self) -> Result<usize> {
        if self.state != HandshakeState::Complete {
            return Err(Error::InvalidState(format!(
                "remote candidates are accepted only after completion (state {:?})",
                self.state
            )));
        }

        let mut accepted = 0;
        loop {
            let envelope = match self.channel.receive_blocking().await {
                Ok(envelope) => envelope,
                Err(Error::TransportClosed(reason)) => {
                    debug!(accepted, "Relay closed: {}", reason);
                    return Ok(accepted);
                }
                Err(e) => return Err(e),
            };

            if envelope.kind != MessageKind::Candidate {
                return Err(Error::UnexpectedMessageKind {
                    state: self.state,
                    expected: MessageKind::Candidate,
                    actual: envelope.kind,
                });
            }

            let candidate = envelope.to_candidate()?;
            self.apply_remote_candidate(candidate).await;
            accepted += 1;
        }
    }

    /// Wait for local gathering to finish and report the candidate relay
    /// counters. `None` when no relay ran (complete gathering, or the
    /// handshake failed).
    pub async fn relay_stats(&mut self) -> Option<RelayStats> {
        let relay = self.relay.take()?;
        Some(relay.finished().await)
    }

    async fn run_initiator(&mut self) -> Result<DescriptionPair> {
        self.enter(HandshakeState::CreateLocalOffer);
        let offer = self
            .engine
            .create_offer()
            .await
            .map_err(|e| Error::EngineCreateFailed(format!("{:#}", e)))?;

        self.enter(HandshakeState::CommitLocalOffer);
        let offer = self.commit_local(offer).await?;

        self.enter(HandshakeState::SendOffer);
        self.channel.send(&Envelope::description(&offer)?).await?;

        self.enter(HandshakeState::AwaitAnswer);
        let answer = self.await_description(MessageKind::Answer).await?;

        self.enter(HandshakeState::ApplyRemoteAnswer);
        self.apply_remote(answer.clone()).await?;

        Ok(DescriptionPair {
            role: self.role,
            local: offer,
            remote: answer,
        })
    }

    async fn run_receiver(&mut self) -> Result<DescriptionPair> {
        self.enter(HandshakeState::AwaitOffer);
        let offer = self.await_description(MessageKind::Offer).await?;

        self.enter(HandshakeState::ApplyRemoteOffer);
        self.apply_remote(offer.clone()).await?;

        self.enter(HandshakeState::CreateLocalAnswer);
        let answer = self
            .engine
            .create_answer()
            .await
            .map_err(|e| Error::EngineCreateFailed(format!("{:#}", e)))?;

        self.enter(HandshakeState::CommitLocalAnswer);
        let answer = self.commit_local(answer).await?;

        self.enter(HandshakeState::SendAnswer);
        self.channel.send(&Envelope::description(&answer)?).await?;

        Ok(DescriptionPair {
            role: self.role,
            local: answer,
            remote: offer,
        })
    }

    /// Apply the local description and return the description to send
    async fn commit_local(&mut self, description: SessionDescription) -> Result<SessionDescription> {
        match self.options.gathering {
            GatheringPolicy::Trickle => {
                let relay = CandidateRelay::start(self.engine.as_ref(), Arc::clone(&self.channel));
                self.relay = Some(relay);
            }
            GatheringPolicy::Complete => candidate::observe_connection_state(self.engine.as_ref()),
        }

        self.engine
            .set_local_description(description.clone())
            .await
            .map_err(|e| Error::EngineApplyFailed(format!("local description: {:#}", e)))?;

        if self.options.gathering == GatheringPolicy::Trickle {
            return Ok(description);
        }

        match self.options.handshake_timeout {
            Some(after) => timeout(after, self.engine.gathering_complete())
                .await
                .map_err(|_| Error::HandshakeTimeout {
                    state: self.state,
                    after,
                })?,
            None => self.engine.gathering_complete().await,
        }
        debug!("Local candidate gathering complete");

        self.engine.local_description().await.ok_or_else(|| {
            Error::EngineApplyFailed("no local description after gathering".to_string())
        })
    }

    /// Receive until the expected description arrives, buffering candidates
    async fn await_description(&mut self, expected: MessageKind) -> Result<SessionDescription> {
        let deadline = self
            .options
            .handshake_timeout
            .map(|after| (Instant::now() + after, after));

        loop {
            let received = match deadline {
                Some((at, after)) => timeout_at(at, self.channel.receive_blocking())
                    .await
                    .map_err(|_| Error::HandshakeTimeout {
                        state: self.state,
                        after,
                    })?,
                None => self.channel.receive_blocking().await,
            };
            let envelope = received?;

            match envelope.kind {
                kind if kind == expected => return envelope.to_description(),
                MessageKind::Candidate => {
                    let candidate = envelope.to_candidate()?;
                    debug!(
                        buffered = self.pending_candidates.len() + 1,
                        "Buffering remote candidate until the remote description is applied"
                    );
                    self.pending_candidates.push(candidate);
                }
                actual => {
                    return Err(Error::UnexpectedMessageKind {
                        state: self.state,
                        expected,
                        actual,
                    })
                }
            }
        }
    }

    /// Apply the remote description, then any candidates buffered before it
    async fn apply_remote(&mut self, description: SessionDescription) -> Result<()> {
        self.engine
            .set_remote_description(description)
            .await
            .map_err(|e| Error::EngineApplyFailed(format!("remote description: {:#}", e)))?;

        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.apply_remote_candidate(candidate).await;
        }

        Ok(())
    }

    async fn apply_remote_candidate(&self, candidate: IceCandidate) {
        match self.engine.add_remote_candidate(candidate).await {
            Ok(()) => debug!("Applied remote candidate"),
            Err(e) => warn!("Engine rejected remote candidate: {:#}", e),
        }
    }

    fn enter(&mut self, state: HandshakeState) {
        debug!(from = ?self.state, to = ?state, "Handshake state transition");
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(role: Role) -> DescriptionPair {
        DescriptionPair {
            role,
            local: SessionDescription::offer("local"),
            remote: SessionDescription::answer("remote"),
        }
    }

    #[test]
    fn test_initiator_pair_accessors() {
        let outcome = pair(Role::Initiator);
        assert_eq!(outcome.offer().sdp, "local");
        assert_eq!(outcome.answer().sdp, "remote");
    }

    #[test]
    fn test_receiver_pair_accessors() {
        let outcome = DescriptionPair {
            role: Role::Receiver,
            local: SessionDescription::answer("mine"),
            remote: SessionDescription::offer("theirs"),
        };
        assert_eq!(outcome.offer().sdp, "theirs");
        assert_eq!(outcome.answer().sdp, "mine");
        assert_eq!(outcome.role(), Role::Receiver);
    }

    #[test]
    fn test_options_from_config() {
        let config = HandshakeConfig::local_preset()
            .with_gathering(GatheringPolicy::Complete)
            .with_timeout_secs(5);
        let options = NegotiationOptions::from(&config);
        assert_eq!(options.gathering, GatheringPolicy::Complete);
        assert_eq!(options.handshake_timeout, Some(Duration::from_secs(5)));

        let options = NegotiationOptions::from(&config.with_timeout_secs(0));
        assert_eq!(options.handshake_timeout, None);
    }

    #[test]
    fn test_default_options_wait_indefinitely() {
        let options = NegotiationOptions::default();
        assert_eq!(options.gathering, GatheringPolicy::Trickle);
        assert!(options.handshake_timeout.is_none());
    }
}
