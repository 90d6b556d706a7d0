use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single geographic coordinate, the unit of ingestion and fan-out.
///
/// Sent as the body of `POST /geo` and pushed to every WebSocket
/// subscriber:
///
/// ```json
/// {"lat":52.52,"lon":13.405}
/// ```
///
/// Integral values are written without a fractional part, so a coordinate
/// of `(10.0, 20.0)` goes over the wire as `{"lat":10,"lon":20}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateEvent {
    #[serde(serialize_with = "serialize_compact", deserialize_with = "deserialize_finite")]
    pub lat: f32,
    #[serde(serialize_with = "serialize_compact", deserialize_with = "deserialize_finite")]
    pub lon: f32,
}

impl CoordinateEvent {
    pub fn new(lat: f32, lon: f32) -> Self {
        Self { lat, lon }
    }
}

/// Largest magnitude that is still written as an integer.
const MAX_COMPACT: f32 = 1.0e15;

fn serialize_compact<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < MAX_COMPACT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f32(*value)
    }
}

fn deserialize_finite<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = f32::deserialize(deserializer)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(D::Error::custom("coordinate must be a finite number"))
    }
}
