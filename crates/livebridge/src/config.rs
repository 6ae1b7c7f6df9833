//! # Peer Configuration
//!
//! Fluent settings for a `Peer`.

use std::time::Duration;

/// Settings applied when a `Peer` is created.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerConfig {
    /// Deadline applied to every `Peer::call`. `None` waits forever.
    pub default_deadline: Option<Duration>,
    /// Buffer size of the `PeerEvent` broadcast channel.
    pub event_capacity: usize,
    /// How many cancelled or timed-out calls are remembered so that their late replies
    /// are dropped quietly. Older ones are forgotten; a reply for one of those counts as
    /// unexpected.
    pub abandoned_horizon: usize,
}

impl PeerConfig {
    pub fn new() -> Self {
        Self {
            default_deadline: None,
            event_capacity: 64,
            abandoned_horizon: 1024,
        }
    }

    pub fn default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }

    /// Clamped to at least one slot.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn abandoned_horizon(mut self, horizon: usize) -> Self {
        self.abandoned_horizon = horizon;
        self
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::new()
    }
}
