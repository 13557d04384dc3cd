//! Transport seam: the duplex byte channel that carries envelope frames.
//!
//! The physical mechanism (named pipe, unix socket, platform IPC) lives
//! behind this trait. The bridge assumes message-boundary-preserving
//! delivery and adds no framing of its own.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Error sending an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The channel has not been started yet.
    #[error("transport not started")]
    NotStarted,
    /// The peer end is gone.
    #[error("transport channel closed")]
    Closed,
    /// The outbound queue is full.
    #[error("transport outbound queue full")]
    Full,
}

/// External collaborator that moves envelope bytes between processes.
///
/// The transport owns the native channel lifecycle: the bridge calls
/// [`start`](Transport::start) exactly once during initialization and
/// [`send`](Transport::send) once per outbound call. Inbound frames travel
/// the other way -- the transport's own execution context feeds them to
/// `Bridge::handle_inbound`.
pub trait Transport: Send + Sync {
    /// Starts the native channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be brought up; this is fatal
    /// to initialization.
    fn start(&self) -> anyhow::Result<()>;

    /// Hands one encoded envelope to the peer. Fire-and-forget: no reply is
    /// awaited.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the frame cannot be accepted.
    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// ChannelTransport
// ---------------------------------------------------------------------------

/// In-process transport backed by a bounded channel.
///
/// Used by tests and by embeddings that run both ends of the bridge in one
/// process. The bounded queue gives the same non-blocking `try_send`
/// semantics a real byte channel would.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Vec<u8>>,
    started: AtomicBool,
}

impl ChannelTransport {
    /// Creates a transport plus the receiver end representing the peer.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                started: AtomicBool::new(false),
            },
            rx,
        )
    }
}

impl Transport for ChannelTransport {
    fn start(&self) -> anyhow::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        self.tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_start_is_rejected() {
        let (transport, _rx) = ChannelTransport::new(4);
        assert_eq!(
            transport.send(vec![1, 2, 3]),
            Err(TransportError::NotStarted)
        );
    }

    #[tokio::test]
    async fn send_after_start_delivers_the_frame() {
        let (transport, mut rx) = ChannelTransport::new(4);
        transport.start().unwrap();
        transport.send(vec![1, 2, 3]).unwrap();
        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        let (transport, _rx) = ChannelTransport::new(1);
        transport.start().unwrap();
        transport.send(vec![1]).unwrap();
        assert_eq!(transport.send(vec![2]), Err(TransportError::Full));
    }

    #[tokio::test]
    async fn dropped_peer_is_reported_as_closed() {
        let (transport, rx) = ChannelTransport::new(1);
        transport.start().unwrap();
        drop(rx);
        assert_eq!(transport.send(vec![1]), Err(TransportError::Closed));
    }
}
