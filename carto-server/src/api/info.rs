use axum::{Json, extract::State, http::Version};
use carto_core::bus::Topic;
use carto_sdk::objects::ServerInfo;
use std::num::NonZeroUsize;
use tokio::runtime::Handle;

use crate::state::AppState;

/// `GET /info`: self-reported configuration and counters.
pub(super) async fn server_info(State(state): State<AppState>, version: Version) -> Json<ServerInfo> {
    Json(ServerInfo {
        protocol: format!("{version:?}"),
        listeners: state.bus.count(&Topic::LOCATIONS),
        concurrent_requests_server: state.max_concurrent_requests,
        num_cpu: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        tasks: Handle::current().metrics().num_alive_tasks(),
        published: state.bus.published(),
        dropped: state.bus.dropped(),
        retained: state.recent.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
