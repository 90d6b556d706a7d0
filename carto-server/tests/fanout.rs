//! End-to-end tests against a real listener on a loopback port.

use carto_core::bus::Topic;
use carto_core::config::{ConfigStore, EventsConfig, LivenessConfig};
use carto_sdk::client::CartoClient;
use carto_sdk::objects::CoordinateEvent;
use carto_server::server::build_router;
use carto_server::state::AppState;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const WRITE_WAIT: Duration = Duration::from_millis(100);
const PONG_WAIT: Duration = Duration::from_millis(400);

struct TestServer {
    state: AppState,
    client: CartoClient,
    base: Url,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    async fn start() -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = AppState::new(
            &EventsConfig::default(),
            ConfigStore::new(LivenessConfig::new(WRITE_WAIT, PONG_WAIT)),
            16,
            shutdown_rx,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let base = Url::parse(&format!("http://{addr}")).unwrap();
        Self {
            state,
            client: CartoClient::new(base.clone()),
            base,
            shutdown,
        }
    }

    fn listeners(&self) -> usize {
        self.state.bus.count(&Topic::LOCATIONS)
    }

    /// Poll until the bus has `n` subscribers, failing after two seconds.
    async fn wait_for_listeners(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.listeners() != n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {n} listeners, have {}",
                self.listeners()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.base.host_str().unwrap(), self.base.port().unwrap())
    }
}

#[tokio::test]
async fn test_three_open_sessions_receive_and_closed_one_does_not() {
    let server = TestServer::start().await;

    let mut open = Vec::new();
    for _ in 0..3 {
        let (socket, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
        open.push(socket);
    }
    let closed = server.client.subscribe().await.unwrap();
    server.wait_for_listeners(4).await;

    closed.close().await.unwrap();
    server.wait_for_listeners(3).await;

    let resp = reqwest::Client::new()
        .post(server.base.join("/geo").unwrap())
        .body(r#"{"lat":10,"lon":20}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(resp.text().await.unwrap().is_empty());

    for socket in &mut open {
        let frame = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match socket.next().await.unwrap().unwrap() {
                    Message::Text(text) => break text,
                    _ => continue,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(frame.as_str(), r#"{"lat":10,"lon":20}"#);
    }

    assert_eq!(server.state.bus.published(), 1);
    assert_eq!(server.state.bus.dropped(), 0);
}

#[tokio::test]
async fn test_events_arrive_in_publish_order() {
    let server = TestServer::start().await;
    let mut stream = server.client.subscribe().await.unwrap();
    server.wait_for_listeners(1).await;

    for i in 0..20 {
        server
            .client
            .post_location(&CoordinateEvent::new(i as f32, -(i as f32)))
            .await
            .unwrap();
    }

    for i in 0..20 {
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event, CoordinateEvent::new(i as f32, -(i as f32)));
    }
}

#[tokio::test]
async fn test_malformed_body_is_rejected_without_publishing() {
    let server = TestServer::start().await;
    let http = reqwest::Client::new();
    let url = server.base.join("/geo").unwrap();

    for body in [r#"{"lat":"x"}"#, r#"{"lat":1}"#, "", "not json"] {
        let resp = http.post(url.clone()).body(body).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST, "body {body:?}");
        assert!(!resp.text().await.unwrap().is_empty());
    }

    assert_eq!(server.state.bus.published(), 0);
    assert!(server.client.recent().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_info_reports_listeners_and_limits() {
    let server = TestServer::start().await;
    let _a = server.client.subscribe().await.unwrap();
    let _b = server.client.subscribe().await.unwrap();
    server.wait_for_listeners(2).await;

    server
        .client
        .post_location(&CoordinateEvent::new(1.0, 2.0))
        .await
        .unwrap();

    let info = server.client.server_info().await.unwrap();
    assert_eq!(info.listeners, 2);
    assert_eq!(info.concurrent_requests_server, 16);
    assert_eq!(info.published, 1);
    assert_eq!(info.retained, 1);
    assert!(info.num_cpu >= 1);
    // Each open session runs a receive task and a send task.
    assert!(info.tasks >= 4, "tasks = {}", info.tasks);
    assert_eq!(info.protocol, "HTTP/1.1");
}

#[tokio::test]
async fn test_recent_serves_ingested_coordinates() {
    let server = TestServer::start().await;

    for (lat, lon) in [(52.52, 13.405), (48.8566, 2.3522)] {
        server
            .client
            .post_location(&CoordinateEvent::new(lat, lon))
            .await
            .unwrap();
    }

    let recent = server.client.recent().await.unwrap();
    assert_eq!(
        recent,
        vec![
            CoordinateEvent::new(52.52, 13.405),
            CoordinateEvent::new(48.8566, 2.3522)
        ]
    );
}

#[tokio::test]
async fn test_unresponsive_subscriber_is_reclaimed() {
    let server = TestServer::start().await;

    // Never polled, so pings go unanswered.
    let (_socket, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
    server.wait_for_listeners(1).await;

    tokio::time::sleep(PONG_WAIT + WRITE_WAIT * 3).await;
    assert_eq!(server.listeners(), 0);
}

#[tokio::test]
async fn test_responsive_subscriber_survives_several_pong_waits() {
    let server = TestServer::start().await;
    let mut stream = server.client.subscribe().await.unwrap();
    server.wait_for_listeners(1).await;

    // Reading drives the client's automatic pong replies.
    let idle = tokio::time::timeout(PONG_WAIT * 3, stream.next()).await;
    assert!(idle.is_err(), "no coordinate was published");
    assert_eq!(server.listeners(), 1);

    stream.send_text("hello\nserver").await.unwrap();
    server
        .client
        .post_location(&CoordinateEvent::new(3.0, 4.0))
        .await
        .unwrap();
    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event, CoordinateEvent::new(3.0, 4.0));
}

#[tokio::test]
async fn test_dropped_connection_releases_subscription() {
    let server = TestServer::start().await;
    let (socket, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
    server.wait_for_listeners(1).await;

    drop(socket);

    server.wait_for_listeners(0).await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let server = TestServer::start().await;
    let mut stream = server.client.subscribe().await.unwrap();
    server.wait_for_listeners(1).await;

    server.shutdown.send_replace(true);

    let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap();
    assert!(matches!(end, None | Some(Err(_))));
    server.wait_for_listeners(0).await;
}
