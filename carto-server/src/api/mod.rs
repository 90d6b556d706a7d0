//! HTTP API handlers.
//!
//! # Endpoints
//!
//! - `POST /geo`    – ingest one coordinate and publish it to subscribers
//! - `GET  /ws`     – WebSocket stream of published coordinates
//! - `GET  /info`   – configuration and counters for load generators
//! - `GET  /recent` – coordinates inside the retention window

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use carto_core::ingest::DecodeError;
use tower::limit::ConcurrencyLimitLayer;

use crate::state::AppState;

mod geo;
mod info;
mod recent;
mod ws;

/// Build the API router.
///
/// Ingestion is capped at `max_concurrent_requests` in-flight requests;
/// excess requests wait for a slot.
pub fn router(max_concurrent_requests: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/geo",
            post(geo::ingest_location).layer(ConcurrencyLimitLayer::new(max_concurrent_requests)),
        )
        .route("/ws", get(ws::subscribe))
        .route("/info", get(info::server_info))
        .route("/recent", get(recent::recent_locations))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in API handlers.
#[derive(Debug)]
enum ApiError {
    /// The ingestion body is not exactly one valid coordinate.
    Decode(DecodeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Decode(e) => {
                tracing::debug!(error = %e, "Rejected coordinate");
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
        }
    }
}
