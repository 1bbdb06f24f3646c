//! Local candidate relay
//!
//! Forwards every local ICE candidate the engine discovers to the peer as a
//! `Candidate` envelope. The engine callback only pushes into a queue; a
//! spawned task drains the queue in discovery order and writes through the
//! shared [`SignalingChannel`]. The end-of-gathering marker (`None`) stops the
//! task without sending anything.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::SignalingChannel;
use crate::engine::{Engine, IceCandidate};
use crate::envelope::Envelope;

/// Counters reported when the relay stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Candidates written to the channel
    pub forwarded: usize,
    /// Candidates that could not be encoded or sent
    pub failed: usize,
}

/// Running candidate relay
pub struct CandidateRelay {
    task: JoinHandle<RelayStats>,
}

impl CandidateRelay {
    /// Install the local candidate callback on `engine` and start forwarding.
    ///
    /// Must be called before the local description is applied so no
    /// candidate is discovered without a handler in place.
    pub fn start(engine: &dyn Engine, channel: Arc<SignalingChannel>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Option<IceCandidate>>();

        engine.on_local_candidate(Box::new(move |candidate| {
            if tx.send(candidate).is_err() {
                debug!("Candidate relay stopped, dropping local candidate");
            }
        }));
        observe_connection_state(engine);

        let task = tokio::spawn(forward_candidates(rx, channel));

        Self { task }
    }

    /// Whether gathering finished (or the relay was aborted)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the end-of-gathering marker and return the counters
    pub async fn finished(self) -> RelayStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Candidate relay task ended abnormally: {}", e);
                RelayStats::default()
            }
        }
    }

    /// Stop forwarding immediately
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Log every connection state transition reported by `engine`
pub fn observe_connection_state(engine: &dyn Engine) {
    engine.on_connection_state_change(Box::new(|state| {
        info!(?state, "Peer connection state changed");
    }));
}

async fn forward_candidates(
    mut rx: mpsc::UnboundedReceiver<Option<IceCandidate>>,
    channel: Arc<SignalingChannel>,
) -> RelayStats {
    let mut stats = RelayStats::default();

    while let Some(event) = rx.recv().await {
        let Some(candidate) = event else {
            debug!(
                forwarded = stats.forwarded,
                failed = stats.failed,
                "Local candidate gathering complete"
            );
            break;
        };

        let envelope = match Envelope::candidate(&candidate) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to encode local candidate: {}", e);
                stats.failed += 1;
                continue;
            }
        };

        match channel.send(&envelope).await {
            Ok(()) => {
                debug!(candidate = %candidate.candidate, "Forwarded local candidate");
                stats.forwarded += 1;
            }
            Err(e) => {
                warn!("Failed to send local candidate: {}", e);
                stats.failed += 1;
            }
        }
    }

    stats
}
