//! In-process relay double
//!
//! [`pair`] returns two relay connections wired back to back. Frames written
//! on one side are read, in order, on the other. Closing or dropping a sink
//! ends the opposite stream, which is how tests inject a relay shutdown.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameSink, FrameStream, RelayConnection};
use crate::{Error, Result};

/// Write half of an in-memory connection
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

/// Read half of an in-memory connection
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Create two connected relay connections
pub fn pair() -> (RelayConnection, RelayConnection) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a = RelayConnection::new(MemorySink { tx: Some(a_tx) }, MemoryStream { rx: b_rx });
    let b = RelayConnection::new(MemorySink { tx: Some(b_tx) }, MemoryStream { rx: a_rx });

    (a, b)
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::TransportError("Sink already closed".to_string()))?;

        tx.send(frame)
            .map_err(|_| Error::TransportError("Remote side disconnected".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.rx.recv().await)
    }
}
