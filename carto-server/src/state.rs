//! Application state shared across all request handlers.

use carto_core::bus::EventBus;
use carto_core::config::{ConfigStore, EventsConfig, LivenessConfig};
use carto_core::ingest::Ingestor;
use carto_core::store::RecentLocations;
use carto_sdk::objects::CoordinateEvent;
use std::sync::Arc;
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Fan-out bus between ingestion and subscriber sessions.
    pub bus: EventBus<CoordinateEvent>,
    /// Decodes `POST /geo` bodies and publishes them on `bus`.
    pub ingestor: Ingestor,
    /// Coordinates ingested within the TTL window.
    pub recent: Arc<RecentLocations>,
    /// Session timing; reloadable via SIGHUP, read when a session opens.
    pub liveness: ConfigStore<LivenessConfig>,
    /// Advertised ingestion concurrency limit.
    pub max_concurrent_requests: usize,
    /// Flips to `true` when the server begins shutting down.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Create a new AppState from the loaded configuration.
    pub fn new(
        events: &EventsConfig,
        liveness: ConfigStore<LivenessConfig>,
        max_concurrent_requests: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let bus = EventBus::with_capacity(events.queue_capacity);
        Self {
            ingestor: Ingestor::new(bus.clone()),
            bus,
            recent: Arc::new(RecentLocations::from_config(events)),
            liveness,
            max_concurrent_requests,
            shutdown,
        }
    }
}
