//! Run configuration and results.

use carto_sdk::objects::ServerInfo;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Completions between progress log lines.
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Fixed at start from the target's `/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkConfig {
    pub target: String,
    pub protocol: String,
    pub concurrent_requests_server: usize,
    /// Worker count; half the server's limit, at least one.
    pub concurrent_requests_client: usize,
}

impl BenchmarkConfig {
    pub fn from_info(target: String, info: &ServerInfo) -> Self {
        Self {
            target,
            protocol: info.protocol.clone(),
            concurrent_requests_server: info.concurrent_requests_server,
            concurrent_requests_client: (info.concurrent_requests_server / 2).max(1),
        }
    }
}

/// Aggregate results of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStats {
    /// Requests dispatched to workers.
    pub total_requests: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Input lines that did not parse.
    pub skipped_lines: u64,
    /// Wall-clock time from first dispatch to last completion.
    pub total_time_ms: u64,
    /// Wall-clock time divided by requests; `None` for an empty run.
    pub avg_time_micros: Option<u64>,
    /// Mean round trip of a single request.
    pub mean_request_micros: u64,
    pub max_request_micros: u64,
}

/// Everything printed at the end of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    #[serde(flatten)]
    pub config: BenchmarkConfig,
    #[serde(flatten)]
    pub stats: BenchmarkStats,
}

/// A finished request, as reported by a worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Completion {
    pub num: u64,
    pub succeeded: bool,
    pub latency: Duration,
}

/// Running totals kept by the coordinator while workers report in.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    completed: u64,
    succeeded: u64,
    latency_micros: u128,
    max_micros: u64,
}

impl Tally {
    pub fn record(&mut self, completion: Completion) {
        self.completed += 1;
        if completion.succeeded {
            self.succeeded += 1;
        }
        let micros = completion.latency.as_micros();
        self.latency_micros += micros;
        self.max_micros = self.max_micros.max(u64::try_from(micros).unwrap_or(u64::MAX));

        if self.completed % PROGRESS_INTERVAL == 0 {
            info!(
                completed = self.completed,
                last = completion.num,
                "Completed {}",
                self.completed
            );
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Final stats. Dispatched requests that never reported back count as
    /// failed.
    pub fn finish(self, dispatched: u64, skipped_lines: u64, elapsed: Duration) -> BenchmarkStats {
        let elapsed_micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let mean_request_micros = match self.completed {
            0 => 0,
            n => u64::try_from(self.latency_micros / u128::from(n)).unwrap_or(u64::MAX),
        };

        BenchmarkStats {
            total_requests: dispatched,
            succeeded: self.succeeded,
            failed: dispatched.saturating_sub(self.succeeded),
            skipped_lines,
            total_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            avg_time_micros: elapsed_micros.checked_div(dispatched),
            mean_request_micros,
            max_request_micros: self.max_micros,
        }
    }
}
