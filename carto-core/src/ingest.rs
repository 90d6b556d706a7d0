//! Ingestion of single coordinates into the event bus.
//!
//! One request body carries exactly one [`CoordinateEvent`]. The body is
//! decoded against the fixed schema first; only a valid event is published,
//! so subscribers never see anything but well-formed coordinates.

use bytes::Bytes;
use carto_sdk::objects::CoordinateEvent;
use kanau::processor::Processor;
use thiserror::Error;
use tracing::trace;

use crate::bus::{EventBus, Topic};

/// Reasons an ingestion body is rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("request body is empty")]
    Empty,

    /// Malformed JSON, missing or non-numeric fields, trailing data
    /// (e.g. a second record) or a value outside the `f32` range.
    #[error("invalid coordinate: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Decodes raw bodies and publishes them on the location topic.
#[derive(Clone)]
pub struct Ingestor {
    bus: EventBus<CoordinateEvent>,
    topic: Topic,
}

impl Ingestor {
    /// Publish onto [`Topic::LOCATIONS`] of `bus`.
    pub fn new(bus: EventBus<CoordinateEvent>) -> Self {
        Self {
            bus,
            topic: Topic::LOCATIONS,
        }
    }

    /// Decode one coordinate from `raw` and publish it.
    ///
    /// Publishing happens before returning; a decode failure publishes
    /// nothing.
    pub fn ingest(&self, raw: &[u8]) -> Result<CoordinateEvent, DecodeError> {
        let event = decode(raw)?;
        let outcome = self.bus.publish(&self.topic, event);
        trace!(
            lat = event.lat,
            lon = event.lon,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Published coordinate"
        );
        Ok(event)
    }
}

/// Decode exactly one coordinate.
pub fn decode(raw: &[u8]) -> Result<CoordinateEvent, DecodeError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_slice(raw)?)
}

impl Processor<Bytes> for Ingestor {
    type Output = CoordinateEvent;
    type Error = DecodeError;

    async fn process(&self, raw: Bytes) -> Result<CoordinateEvent, DecodeError> {
        self.ingest(&raw)
    }
}
