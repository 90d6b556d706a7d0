use axum::{Json, extract::State};
use carto_sdk::objects::CoordinateEvent;

use crate::state::AppState;

/// `GET /recent`: coordinates ingested within the TTL, oldest first.
pub(super) async fn recent_locations(State(state): State<AppState>) -> Json<Vec<CoordinateEvent>> {
    Json(state.recent.snapshot())
}
