//! In-process duplex transport.
//!
//! Connects two peers living in the same process: the test suites and the
//! `livesuite` runner both talk over it.

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// One end of an ordered, unbounded frame channel.
///
/// Frames sent on one end arrive at the other end's `recv` in send order.
/// Dropping an end makes the other end's `recv` return `Ok(None)` once the
/// frames already in flight have been drained.
pub struct DuplexChannelTransport {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl DuplexChannelTransport {
    pub fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            outbound,
            inbound: Mutex::new(inbound),
        }
    }

    /// Two ends wired to each other.
    pub fn pair() -> (Self, Self) {
        let (to_right, from_left) = mpsc::unbounded_channel();
        let (to_left, from_right) = mpsc::unbounded_channel();
        (Self::new(to_right, from_right), Self::new(to_left, from_left))
    }
}

#[async_trait::async_trait]
impl Transport for DuplexChannelTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        self.outbound.send(payload.to_vec()).map_err(|_| {
            transport::Error::ConnectionLost("Other end of the channel was dropped".into())
        })
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        Ok(self.inbound.lock().await.recv().await)
    }
}
