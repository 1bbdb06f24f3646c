//! WebSocket relay transport

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info};

use super::{Dialer, FrameSink, FrameStream, RelayConnection};
use crate::{Error, Result};

/// Dials relays with `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, endpoint: &str) -> Result<RelayConnection> {
        info!("Connecting to relay: {}", endpoint);

        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| Error::DialFailed(format!("{}: {}", endpoint, e)))?;

        info!("Connected to relay");

        Ok(split(ws_stream))
    }
}

/// Split an established WebSocket into relay connection halves
pub fn split<S>(ws_stream: WebSocketStream<S>) -> RelayConnection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (write, read) = ws_stream.split();
    RelayConnection::new(WebSocketSink { write }, WebSocketSource { read })
}

struct WebSocketSink<S> {
    write: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> FrameSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        // Envelopes are JSON, so they normally travel as text frames
        let message = match String::from_utf8(frame) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };

        self.write
            .send(message)
            .await
            .map_err(|e| Error::TransportError(format!("Failed to send WebSocket message: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .close()
            .await
            .map_err(|e| Error::TransportError(format!("Failed to close WebSocket: {}", e)))
    }
}

struct WebSocketSource<S> {
    read: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameStream for WebSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        while let Some(msg_result) = self.read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Ok(Some(text.into_bytes())),
                Ok(Message::Binary(data)) => return Ok(Some(data)),
                Ok(Message::Close(frame)) => {
                    debug!("WebSocket closed by relay: {:?}", frame);
                    return Ok(None);
                }
                Ok(_) => continue,
                Err(e) => return Err(Error::TransportClosed(format!("WebSocket error: {}", e))),
            }
        }

        Ok(None)
    }
}
