//! Subscriber liveness configuration.

use std::time::Duration;

/// Ping/pong and write timing for subscriber sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Time allowed to write one frame to the peer.
    pub write_wait: Duration,
    /// Time allowed between pongs before the peer is considered dead.
    pub pong_wait: Duration,
}

impl LivenessConfig {
    pub fn new(write_wait: Duration, pong_wait: Duration) -> Self {
        Self {
            write_wait,
            pong_wait,
        }
    }

    /// Interval between pings. Always shorter than `pong_wait` so a healthy
    /// peer answers before its read deadline passes.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(3))
    }
}
