use axum::{
    extract::{State, ws::WebSocketUpgrade},
    response::IntoResponse,
};

use crate::session::Session;
use crate::state::AppState;

/// `GET /ws`: live coordinate stream.
///
/// Upgrades the HTTP connection to a WebSocket and hands it to a
/// [`Session`], which pushes every published coordinate as a JSON text
/// frame and pings the peer until the connection ends.
pub(super) async fn subscribe(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let liveness = state.liveness.snapshot();
        Session::new(liveness)
            .run(socket, state.bus, state.shutdown)
            .await;
    })
}
