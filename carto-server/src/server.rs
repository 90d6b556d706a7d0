//! Axum server setup and router configuration.

use crate::api;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .merge(api::router(state.max_concurrent_requests))
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the server until `shutdown` completes.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use carto_core::config::{ConfigStore, EventsConfig, LivenessConfig};
    use carto_sdk::objects::ServerInfo;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let (_tx, rx) = watch::channel(false);
        AppState::new(
            &EventsConfig::default(),
            ConfigStore::new(LivenessConfig::default()),
            8,
            rx,
        )
    }

    fn post_geo(body: &'static str) -> Request<Body> {
        Request::post("/geo").body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = build_router(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_geo_accepts_and_publishes() {
        let state = test_state();
        let mut subscription = state.bus.subscribe(&carto_core::bus::Topic::LOCATIONS);

        let resp = build_router(state.clone())
            .oneshot(post_geo(r#"{"lat":10,"lon":20}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(
            subscription.try_recv(),
            Some(carto_sdk::objects::CoordinateEvent::new(10.0, 20.0))
        );
        assert_eq!(state.recent.len(), 1);
    }

    #[tokio::test]
    async fn test_geo_rejects_malformed_body() {
        let state = test_state();

        let resp = build_router(state.clone())
            .oneshot(post_geo(r#"{"lat":"x"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.bus.published(), 0);
        assert!(state.recent.is_empty());
    }

    #[tokio::test]
    async fn test_info_without_listeners() {
        let resp = build_router(test_state())
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let info: ServerInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.listeners, 0);
        assert_eq!(info.concurrent_requests_server, 8);
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let resp = build_router(test_state())
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }
}
