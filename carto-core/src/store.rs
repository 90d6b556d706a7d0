//! Recently ingested coordinates, kept for a fixed time-to-live.
//!
//! In-memory only. Lets a newly opened map draw the current picture before
//! the live stream takes over.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use carto_sdk::objects::CoordinateEvent;
use tokio::time::Instant;

use crate::config::EventsConfig;

/// Time-bounded, size-bounded buffer of recent coordinates in arrival order.
pub struct RecentLocations {
    entries: Mutex<VecDeque<(Instant, CoordinateEvent)>>,
    ttl: Duration,
    max: usize,
}

impl RecentLocations {
    pub fn new(ttl: Duration, max: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            ttl,
            max: max.max(1),
        }
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        Self::new(config.ttl, config.retain_max)
    }

    /// Remember `event`, evicting the oldest entry when full.
    pub fn record(&self, event: CoordinateEvent) {
        let now = Instant::now();
        let mut entries = self.lock();
        self.prune(&mut entries, now);
        if entries.len() == self.max {
            entries.pop_front();
        }
        entries.push_back((now, event));
    }

    /// Coordinates younger than the TTL, oldest first.
    pub fn snapshot(&self) -> Vec<CoordinateEvent> {
        let mut entries = self.lock();
        self.prune(&mut entries, Instant::now());
        entries.iter().map(|(_, event)| *event).collect()
    }

    pub fn len(&self) -> usize {
        let mut entries = self.lock();
        self.prune(&mut entries, Instant::now());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, entries: &mut VecDeque<(Instant, CoordinateEvent)>, now: Instant) {
        while let Some((at, _)) = entries.front() {
            if now.duration_since(*at) < self.ttl {
                break;
            }
            entries.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<(Instant, CoordinateEvent)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
