//! Scripted engine double
//!
//! Produces deterministic descriptions, records everything applied to it and,
//! once the local description is applied, emits its scripted local candidates
//! from a separate task followed by the end-of-gathering marker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use handshake_signaling::engine::{CandidateHandler, StateChangeHandler};
use handshake_signaling::{ConnectionState, Engine, IceCandidate, SessionDescription};
use tokio::sync::watch;

/// Failure to inject into one engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    CreateDescription,
    ApplyLocal,
    ApplyRemote,
}

/// What the engine observed, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    LocalApplied(SessionDescription),
    RemoteApplied(SessionDescription),
    CandidateApplied(IceCandidate),
    CandidateRejected(IceCandidate),
}

#[derive(Default)]
struct Recorded {
    events: Vec<Event>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
}

#[derive(Default)]
struct Handlers {
    candidate: Option<CandidateHandler>,
    state: Option<StateChangeHandler>,
}

pub struct FakeEngine {
    name: String,
    local_candidates: Vec<IceCandidate>,
    candidate_spacing: Duration,
    failure: Option<Failure>,
    recorded: Mutex<Recorded>,
    handlers: Arc<Mutex<Handlers>>,
    gathered_tx: Arc<watch::Sender<bool>>,
    gathered_rx: watch::Receiver<bool>,
}

impl FakeEngine {
    pub fn new(name: &str) -> Self {
        let (gathered_tx, gathered_rx) = watch::channel(false);
        Self {
            name: name.to_string(),
            local_candidates: Vec::new(),
            candidate_spacing: Duration::from_millis(1),
            failure: None,
            recorded: Mutex::new(Recorded::default()),
            handlers: Arc::new(Mutex::new(Handlers::default())),
            gathered_tx: Arc::new(gathered_tx),
            gathered_rx,
        }
    }

    /// Local candidates emitted after the local description is applied
    pub fn with_local_candidates(mut self, candidates: Vec<IceCandidate>) -> Self {
        self.local_candidates = candidates;
        self
    }

    /// Delay between emitted candidates
    pub fn with_candidate_spacing(mut self, spacing: Duration) -> Self {
        self.candidate_spacing = spacing;
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.recorded.lock().unwrap().events.clone()
    }

    pub fn applied_local(&self) -> Option<SessionDescription> {
        self.recorded.lock().unwrap().local.clone()
    }

    pub fn applied_remote(&self) -> Option<SessionDescription> {
        self.recorded.lock().unwrap().remote.clone()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::CandidateApplied(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.recorded.lock().unwrap().events.push(event);
    }

    fn notify_state(&self, state: ConnectionState) {
        if let Some(handler) = self.handlers.lock().unwrap().state.as_ref() {
            handler(state);
        }
    }

    fn start_gathering(&self) {
        let candidates = self.local_candidates.clone();
        let spacing = self.candidate_spacing;
        let handlers = Arc::clone(&self.handlers);
        let gathered_tx = Arc::clone(&self.gathered_tx);

        tokio::spawn(async move {
            for candidate in candidates {
                tokio::time::sleep(spacing).await;
                if let Some(handler) = handlers.lock().unwrap().candidate.as_ref() {
                    handler(Some(candidate));
                }
            }
            if let Some(handler) = handlers.lock().unwrap().candidate.as_ref() {
                handler(None);
            }
            let _ = gathered_tx.send(true);
        });
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn create_offer(&self) -> anyhow::Result<SessionDescription> {
        if self.failure == Some(Failure::CreateDescription) {
            bail!("{} cannot create an offer", self.name);
        }
        Ok(SessionDescription::offer(format!(
            "v=0\r\no={} offer\r\n",
            self.name
        )))
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        if self.failure == Some(Failure::CreateDescription) {
            bail!("{} cannot create an answer", self.name);
        }
        if self.recorded.lock().unwrap().remote.is_none() {
            bail!("no remote offer applied");
        }
        Ok(SessionDescription::answer(format!(
            "v=0\r\no={} answer\r\n",
            self.name
        )))
    }

    async fn set_local_description(&self, description: SessionDescription) -> anyhow::Result<()> {
        if self.failure == Some(Failure::ApplyLocal) {
            bail!("{} rejected its local description", self.name);
        }
        {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.local = Some(description.clone());
            recorded.events.push(Event::LocalApplied(description));
        }
        self.notify_state(ConnectionState::Connecting);
        self.start_gathering();
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> anyhow::Result<()> {
        if self.failure == Some(Failure::ApplyRemote) {
            bail!("{} rejected the remote description", self.name);
        }
        let mut recorded = self.recorded.lock().unwrap();
        recorded.remote = Some(description.clone());
        recorded.events.push(Event::RemoteApplied(description));
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let mut local = self.recorded.lock().unwrap().local.clone()?;
        if *self.gathered_rx.borrow() {
            for candidate in &self.local_candidates {
                local.sdp.push_str(&format!("a={}\r\n", candidate.candidate));
            }
        }
        Some(local)
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()> {
        if self.recorded.lock().unwrap().remote.is_none() {
            self.record(Event::CandidateRejected(candidate));
            return Err(anyhow!("remote description not set"));
        }
        self.record(Event::CandidateApplied(candidate));
        Ok(())
    }

    fn on_local_candidate(&self, handler: CandidateHandler) {
        self.handlers.lock().unwrap().candidate = Some(handler);
    }

    fn on_connection_state_change(&self, handler: StateChangeHandler) {
        self.handlers.lock().unwrap().state = Some(handler);
    }

    async fn gathering_complete(&self) {
        let mut rx = self.gathered_rx.clone();
        let _ = rx.wait_for(|gathered| *gathered).await;
    }
}
