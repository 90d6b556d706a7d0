//! Server configuration.

use std::net::SocketAddr;

/// Server configuration with runtime values.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address and port to listen on.
    pub listen: SocketAddr,
    /// Limit on ingestion requests served at once. Advertised through
    /// `GET /info` so load generators can size themselves below it.
    pub max_concurrent_requests: usize,
}
