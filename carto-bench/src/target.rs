//! The server under load.

use async_trait::async_trait;
use carto_sdk::client::{CartoClient, ClientError};
use carto_sdk::objects::{CoordinateEvent, ServerInfo};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// One failed outbound request. Logged and counted; never retried.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Something the benchmark can send coordinates to.
#[async_trait]
pub trait Target: Send + Sync + 'static {
    /// Human-readable address, used in reports.
    fn endpoint(&self) -> String;

    /// The target's self-reported configuration.
    async fn info(&self) -> Result<ServerInfo, RequestError>;

    /// Deliver one coordinate.
    async fn send(&self, event: &CoordinateEvent) -> Result<(), RequestError>;
}

/// A Cartographer server reached over HTTP.
pub struct HttpTarget {
    client: CartoClient,
    write_endpoint: String,
}

impl HttpTarget {
    /// Create a target rooted at `host` with per-request `timeout`.
    pub fn new(host: Url, write_endpoint: &str, info_endpoint: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client: CartoClient::new(host)
                .with_http_client(http)
                .with_endpoints(write_endpoint, info_endpoint),
            write_endpoint: write_endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Target for HttpTarget {
    fn endpoint(&self) -> String {
        self.client
            .base_url()
            .join(&self.write_endpoint)
            .map_or_else(|_| self.client.base_url().to_string(), |url| url.to_string())
    }

    async fn info(&self) -> Result<ServerInfo, RequestError> {
        Ok(self.client.server_info().await?)
    }

    async fn send(&self, event: &CoordinateEvent) -> Result<(), RequestError> {
        Ok(self.client.post_location(event).await?)
    }
}
