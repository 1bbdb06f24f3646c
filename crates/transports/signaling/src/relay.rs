//! Two-party WebSocket relay
//!
//! Accepts WebSocket clients and copies every frame one client sends to every
//! other connected client, unchanged. Frames sent while a client is alone are
//! held and delivered to the next client that connects, so the initiator may
//! send its offer before the receiver has dialed. Held frames are dropped when
//! their sender disconnects. The relay does not parse envelopes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::transport::{websocket, FrameStream};
use crate::{Error, Result};

#[derive(Default)]
struct RelayState {
    clients: HashMap<Uuid, mpsc::UnboundedSender<Vec<u8>>>,
    /// Frames no other client received yet, tagged with their sender
    backlog: Vec<(Uuid, Vec<u8>)>,
}

type SharedState = Arc<RwLock<RelayState>>;

/// Bound, not yet running relay
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RelayServer {
    /// Bind the listening socket
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Relay bound to ws://{}/ws", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the relay listens on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the accept loop on the current runtime
    pub fn start(self) -> RelayHandle {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let local_addr = self.local_addr;
        let listener = self.listener;

        let task = tokio::spawn(async move {
            let state: SharedState = Arc::new(RwLock::new(RelayState::default()));
            let mut connections = JoinSet::new();

            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                info!("Accepted relay client from {}", peer_addr);
                                let state = Arc::clone(&state);
                                connections.spawn(async move {
                                    if let Err(e) = handle_client(stream, state).await {
                                        warn!("Relay client {} ended with error: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept relay client: {}", e);
                            }
                        }
                    }
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    _ = shutdown_rx.recv() => {
                        info!("Relay received shutdown signal");
                        break;
                    }
                }
            }

            connections.shutdown().await;
            info!("Relay accept loop exited");
        });

        RelayHandle {
            local_addr,
            shutdown_tx,
            task,
        }
    }
}

/// Handle for a running relay
pub struct RelayHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Address the relay listens on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL clients should dial
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.local_addr)
    }

    /// Stop accepting clients and disconnect the connected ones
    pub async fn shutdown(self) {
        info!("Sending shutdown signal to relay");
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.task.await {
            warn!("Relay task ended abnormally: {}", e);
        }
    }
}

async fn handle_client(stream: TcpStream, state: SharedState) -> Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| Error::TransportError(format!("WebSocket handshake failed: {}", e)))?;
    let connection = websocket::split(ws_stream);
    let mut sink = connection.sink;
    let mut source = connection.stream;

    let client_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    {
        let mut state = state.write().await;
        let held = std::mem::take(&mut state.backlog);
        if !held.is_empty() {
            debug!(%client_id, frames = held.len(), "Delivering held frames");
        }
        for (_, frame) in held {
            let _ = tx.send(frame);
        }
        state.clients.insert(client_id, tx);
    }
    debug!(%client_id, "Relay client registered");

    let forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                error!("Failed to deliver frame to relay client: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let result = relay_frames(client_id, source.as_mut(), &state).await;

    {
        let mut state = state.write().await;
        state.clients.remove(&client_id);

        let held = state.backlog.len();
        state.backlog.retain(|(sender, _)| *sender != client_id);
        let dropped = held - state.backlog.len();
        if dropped > 0 {
            debug!(%client_id, frames = dropped, "Dropped held frames of departed client");
        }
    }
    debug!(%client_id, "Relay client removed");

    // The sender was dropped with the map entry, so the forwarder drains and exits
    if let Err(e) = forward_task.await {
        warn!("Relay forwarder ended abnormally: {}", e);
    }

    result
}

async fn relay_frames(
    client_id: Uuid,
    source: &mut dyn FrameStream,
    state: &SharedState,
) -> Result<()> {
    while let Some(frame) = source.receive().await? {
        let mut state = state.write().await;

        let mut delivered = 0;
        for (_, target) in state.clients.iter().filter(|(id, _)| **id != client_id) {
            if target.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            debug!(%client_id, bytes = frame.len(), "No other client connected, holding frame");
            state.backlog.push((client_id, frame));
        }
    }

    Ok(())
}
