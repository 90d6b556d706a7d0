//! Coordinate input files.
//!
//! One record per line, `lat,lon` followed by any number of extra
//! comma-separated columns, which are ignored:
//!
//! ```text
//! 52.52,13.405,Berlin
//! 48.8566,2.3522,Paris
//! ```

use carto_sdk::objects::CoordinateEvent;
use thiserror::Error;

/// A line that does not start with two finite numbers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("expected `lat,lon`, found {0} field(s)")]
    MissingField(usize),

    #[error("{field} is not a finite number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Parse one input line into a coordinate.
pub fn parse_line(line: &str) -> Result<CoordinateEvent, ParseError> {
    let mut fields = line.split(',');
    let (Some(lat), Some(lon)) = (fields.next(), fields.next()) else {
        return Err(ParseError::MissingField(line.split(',').count()));
    };

    Ok(CoordinateEvent::new(
        parse_field("lat", lat)?,
        parse_field("lon", lon)?,
    ))
}

/// Parse one raw input line, as read from the file, into a coordinate.
pub fn parse_record(raw: &[u8]) -> Result<CoordinateEvent, ParseError> {
    parse_line(std::str::from_utf8(raw)?)
}

fn parse_field(field: &'static str, raw: &str) -> Result<f32, ParseError> {
    let raw = raw.trim();
    match raw.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::InvalidNumber {
            field,
            value: raw.to_string(),
        }),
    }
}
