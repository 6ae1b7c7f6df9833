//! # Transport Abstraction
//!
//! A minimal, async interface for moving frames between two peers.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about frames or values.
//!   It moves opaque buffers.
//! - **Ordered Duplex**: Buffers sent by one side arrive at the other side in send order.
//!   Replies to different calls may still complete in any order; correlation is the
//!   peer's job, not the transport's.

use std::fmt;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The other side is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A single logical, ordered, reliable duplex channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one frame.
    ///
    /// # Invariants
    /// - Frames passed to `send` are delivered in call order.
    /// - Should not interpret the payload content.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Waits for the next inbound frame.
    ///
    /// Returns `Ok(None)` once the other side has closed the channel.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
