//! Request/response client for ingestion and diagnostics.

use reqwest::Client;
use url::Url;

use super::{ClientError, LocationStream};
use crate::objects::{CoordinateEvent, ServerInfo};

const DEFAULT_INGEST_PATH: &str = "/geo";
const DEFAULT_INFO_PATH: &str = "/info";
const RECENT_PATH: &str = "/recent";
const SUBSCRIBE_PATH: &str = "/ws";

/// Typed client for a Cartographer server.
///
/// Cheap to clone; clones share the underlying connection pool, so one
/// client can be handed to many concurrent workers.
#[derive(Debug, Clone)]
pub struct CartoClient {
    http: Client,
    base_url: Url,
    ingest_path: String,
    info_path: String,
}

impl CartoClient {
    /// Create a new client for the server rooted at `base_url`
    /// (e.g. `http://localhost:8080`).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
            ingest_path: DEFAULT_INGEST_PATH.to_string(),
            info_path: DEFAULT_INFO_PATH.to_string(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or HTTP/2 prior knowledge).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Override the ingestion and info endpoint paths.
    pub fn with_endpoints(mut self, ingest: impl Into<String>, info: impl Into<String>) -> Self {
        self.ingest_path = ingest.into();
        self.info_path = info.into();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST /geo` – publish one coordinate.
    pub async fn post_location(&self, event: &CoordinateEvent) -> Result<(), ClientError> {
        let url = self.base_url.join(&self.ingest_path)?;
        let resp = self.http.post(url).json(event).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }

    /// `GET /info` – the server's self-reported configuration and counters.
    pub async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let url = self.base_url.join(&self.info_path)?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /recent` – coordinates still inside the server's retention window.
    pub async fn recent(&self) -> Result<Vec<CoordinateEvent>, ClientError> {
        let url = self.base_url.join(RECENT_PATH)?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /ws` – open a live coordinate stream.
    pub async fn subscribe(&self) -> Result<LocationStream, ClientError> {
        let mut url = self.base_url.join(SUBSCRIBE_PATH)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::Scheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Scheme(scheme.to_string()))?;

        LocationStream::connect(url.as_str()).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
