//! TOML file configuration structures.
//!
//! These structs directly map to the `carto-config.toml` file format.
//! Every section and key is optional.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Ingestion requests served at once; also reported by `GET /info`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_concurrent_requests() -> usize {
    1000
}

/// Subscriber liveness section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Time allowed to write a frame to a subscriber, in milliseconds.
    #[serde(default = "default_wait_ms")]
    pub write_wait_ms: u64,
    /// Time allowed between pongs from a subscriber, in milliseconds.
    #[serde(default = "default_wait_ms")]
    pub pong_wait_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            write_wait_ms: default_wait_ms(),
            pong_wait_ms: default_wait_ms(),
        }
    }
}

fn default_wait_ms() -> u64 {
    3000
}

/// Event fan-out and retention section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Per-subscriber queue depth.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Seconds a coordinate stays in the recent-location store.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum coordinates kept in the recent-location store.
    #[serde(default = "default_retain_max")]
    pub retain_max: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            ttl_secs: default_ttl_secs(),
            retain_max: default_retain_max(),
        }
    }
}

fn default_queue_capacity() -> usize {
    carto_core::bus::DEFAULT_QUEUE_CAPACITY
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_retain_max() -> usize {
    10_000
}
