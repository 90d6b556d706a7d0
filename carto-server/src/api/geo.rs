use axum::{extract::State, http::StatusCode};
use bytes::Bytes;
use kanau::processor::Processor;

use super::ApiError;
use crate::state::AppState;

/// `POST /geo`: ingest one coordinate.
///
/// Body: `{"lat":52.52,"lon":13.405}`. Exactly one coordinate per request.
/// The coordinate is published to every open subscriber before the empty
/// `200 OK` is returned; a malformed body yields `400` and publishes nothing.
pub(super) async fn ingest_location(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event = state
        .ingestor
        .process(body)
        .await
        .map_err(ApiError::Decode)?;
    state.recent.record(event);
    Ok(StatusCode::OK)
}
