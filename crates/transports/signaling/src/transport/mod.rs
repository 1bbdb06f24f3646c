//! Relay transport seam
//!
//! A relay connection is an ordered, reliable, message-framed pipe to the
//! remote peer. It is split into a [`FrameSink`] and a [`FrameStream`] so the
//! signaling channel can guard the write half and the read half with
//! independent locks.

pub mod memory;
pub mod websocket;

pub use websocket::WebSocketDialer;

use async_trait::async_trait;

use crate::Result;

/// Write half of a relay connection
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame
    async fn send(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Close the write half
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a relay connection
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next frame. `Ok(None)` means the relay closed the
    /// connection.
    async fn receive(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Both halves of one relay connection
pub struct RelayConnection {
    /// Write half
    pub sink: Box<dyn FrameSink>,
    /// Read half
    pub stream: Box<dyn FrameStream>,
}

impl RelayConnection {
    /// Assemble a connection from its halves
    pub fn new(sink: impl FrameSink + 'static, stream: impl FrameStream + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}

/// Opens relay connections
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to the relay at `endpoint`
    async fn dial(&self, endpoint: &str) -> Result<RelayConnection>;
}
