use serde::{Deserialize, Serialize};

/// Snapshot returned by `GET /info`.
///
/// Load generators read `concurrent_requests_server` to size their worker
/// pool; the remaining fields are diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// HTTP version the info request arrived on, e.g. `HTTP/2.0`.
    #[serde(default)]
    pub protocol: String,
    /// Open subscriber connections on the location topic.
    #[serde(default)]
    pub listeners: usize,
    /// Advertised limit on concurrently served ingestion requests.
    pub concurrent_requests_server: usize,
    #[serde(rename = "numCPU", default)]
    pub num_cpu: usize,
    /// Tasks alive on the server's runtime.
    #[serde(default)]
    pub tasks: usize,
    /// Events published since start.
    #[serde(default)]
    pub published: u64,
    /// Per-subscriber deliveries dropped because a queue was full.
    #[serde(default)]
    pub dropped: u64,
    /// Coordinates currently held by the recent-location store.
    #[serde(default)]
    pub retained: usize,
    #[serde(default)]
    pub version: String,
}
