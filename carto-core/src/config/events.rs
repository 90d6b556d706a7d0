//! Event fan-out and retention configuration.

use std::time::Duration;

use crate::bus::DEFAULT_QUEUE_CAPACITY;

/// Event fan-out and retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventsConfig {
    /// Per-subscriber queue depth before events are dropped.
    pub queue_capacity: usize,
    /// How long an ingested coordinate stays in the recent-location store.
    pub ttl: Duration,
    /// Upper bound on coordinates held by the recent-location store.
    pub retain_max: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ttl: Duration::from_secs(60),
            retain_max: 10_000,
        }
    }
}
