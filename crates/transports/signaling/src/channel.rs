//! Signaling channel over a relay connection
//!
//! Sends and receives whole envelopes. Writes are serialized by a lock on the
//! write half so the candidate relay task and the state machine can share one
//! channel without interleaving frames. Reads go through a separate lock, so
//! a pending receive never blocks a send.

use tokio::sync::Mutex;
use tracing::debug;

use crate::envelope::{self, Envelope};
use crate::transport::{Dialer, FrameSink, FrameStream, RelayConnection};
use crate::{Error, Result};

/// One peer's connection to the relay
///
/// # Example
///
/// ```
/// use handshake_signaling::envelope::{Envelope, MessageKind};
/// use handshake_signaling::transport::memory;
/// use handshake_signaling::SignalingChannel;
///
/// # tokio_test::block_on(async {
/// let (a, b) = memory::pair();
/// let (alice, bob) = (SignalingChannel::new(a), SignalingChannel::new(b));
///
/// alice
///     .send(&Envelope::new(MessageKind::Candidate, b"{}".to_vec()))
///     .await?;
/// let envelope = bob.receive_blocking().await?;
/// assert_eq!(envelope.kind, MessageKind::Candidate);
/// # Ok::<(), handshake_signaling::Error>(())
/// # }).unwrap();
/// ```
pub struct SignalingChannel {
    writer: Mutex<Box<dyn FrameSink>>,
    reader: Mutex<Box<dyn FrameStream>>,
}

impl SignalingChannel {
    /// Wrap an established relay connection
    pub fn new(connection: RelayConnection) -> Self {
        Self {
            writer: Mutex::new(connection.sink),
            reader: Mutex::new(connection.stream),
        }
    }

    /// Dial the relay at `endpoint` and wrap the connection
    pub async fn connect(dialer: &dyn Dialer, endpoint: &str) -> Result<Self> {
        let connection = dialer.dial(endpoint).await?;
        Ok(Self::new(connection))
    }

    /// Encode and write one envelope
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let frame = envelope.encode()?;
        let bytes = frame.len();

        let mut writer = self.writer.lock().await;
        writer.send(frame).await?;

        debug!(kind = ?envelope.kind, bytes, "Sent envelope");
        Ok(())
    }

    /// Wait for the next envelope from the peer.
    ///
    /// Fails with [`Error::TransportClosed`] when the relay connection ends,
    /// and with a decode error when the frame is not a valid envelope.
    pub async fn receive_blocking(&self) -> Result<Envelope> {
        let frame = {
            let mut reader = self.reader.lock().await;
            reader.receive().await?
        };

        let frame = frame
            .ok_or_else(|| Error::TransportClosed("relay closed the connection".to_string()))?;

        let envelope = envelope::decode(&frame)?;
        debug!(kind = ?envelope.kind, bytes = frame.len(), "Received envelope");
        Ok(envelope)
    }

    /// Close the write half of the relay connection
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageKind;
    use crate::transport::memory;

    #[tokio::test]
    async fn test_send_and_receive_envelope() {
        let (a, b) = memory::pair();
        let alice = SignalingChannel::new(a);
        let bob = SignalingChannel::new(b);

        alice
            .send(&Envelope::new(MessageKind::Offer, b"{}".to_vec()))
            .await
            .unwrap();

        let received = bob.receive_blocking().await.unwrap();
        assert_eq!(received.kind, MessageKind::Offer);
        assert_eq!(received.payload, b"{}".to_vec());
    }

    #[tokio::test]
    async fn test_receive_after_close_is_transport_closed() {
        let (a, b) = memory::pair();
        let alice = SignalingChannel::new(a);
        let bob = SignalingChannel::new(b);

        alice.close().await.unwrap();

        let err = bob.receive_blocking().await.unwrap_err();
        assert!(matches!(err, Error::TransportClosed(_)));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_reported() {
        let (mut raw, b) = memory::pair();
        let bob = SignalingChannel::new(b);

        raw.sink.send(b"not json".to_vec()).await.unwrap();

        let err = bob.receive_blocking().await.unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (a, mut raw) = memory::pair();
        let alice = std::sync::Arc::new(SignalingChannel::new(a));

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let alice = alice.clone();
            tasks.push(tokio::spawn(async move {
                alice
                    .send(&Envelope::new(MessageKind::Candidate, vec![i; 64]))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..8 {
            let frame = raw.stream.receive().await.unwrap().unwrap();
            let envelope = envelope::decode(&frame).unwrap();
            assert_eq!(envelope.kind, MessageKind::Candidate);
            assert!(envelope.payload.iter().all(|b| *b == envelope.payload[0]));
            seen.push(envelope.payload[0]);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..8u8).collect::<Vec<_>>());
    }
}
