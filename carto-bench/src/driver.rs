//! Fixed-size worker pool that replays coordinates against a [`Target`].
//!
//! The coordinator reads input lines, parses them and pushes one job per
//! coordinate onto a queue bounded at the worker count. Every job a worker
//! takes produces exactly one completion, whether the request succeeds,
//! fails or panics. Once completions match dispatches the workers are
//! stopped and joined.

use std::sync::Arc;

use carto_sdk::objects::CoordinateEvent;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::input::parse_record;
use crate::stats::{BenchmarkConfig, BenchmarkReport, BenchmarkStats, Completion, Tally};
use crate::target::{RequestError, Target};

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("failed to read target info: {0}")]
    Info(#[source] RequestError),

    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),

    #[error("all workers exited before the input was consumed")]
    WorkersExited,
}

struct Job {
    num: u64,
    event: CoordinateEvent,
}

type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Drives one benchmark run against a target.
pub struct BenchmarkDriver<T> {
    target: Arc<T>,
    config: BenchmarkConfig,
}

impl<T: Target> BenchmarkDriver<T> {
    /// Read the target's `/info` and size the pool from it.
    pub async fn connect(target: T) -> Result<Self, BenchError> {
        let info = target.info().await.map_err(BenchError::Info)?;
        let config = BenchmarkConfig::from_info(target.endpoint(), &info);
        info!(
            target = %config.target,
            protocol = %config.protocol,
            server_limit = config.concurrent_requests_server,
            workers = config.concurrent_requests_client,
            "Target configuration"
        );
        Ok(Self::with_config(target, config))
    }

    pub fn with_config(target: T, config: BenchmarkConfig) -> Self {
        Self {
            target: Arc::new(target),
            config,
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn report(&self, stats: BenchmarkStats) -> BenchmarkReport {
        BenchmarkReport {
            config: self.config.clone(),
            stats,
        }
    }

    /// Send one request per valid line of `input` and wait for all of them.
    pub async fn run<R>(&self, input: R) -> Result<BenchmarkStats, BenchError>
    where
        R: AsyncBufRead + Unpin,
    {
        let workers = self.config.concurrent_requests_client.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(workers);
        let job_rx: JobQueue = Arc::new(Mutex::new(job_rx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    self.target.clone(),
                    job_rx.clone(),
                    done_tx.clone(),
                    stop_rx.clone(),
                ))
            })
            .collect();
        // Workers hold the only senders from here on.
        drop(done_tx);
        drop(job_rx);

        let start = Instant::now();
        let mut tally = Tally::default();
        let read = dispatch(input, &job_tx, &mut done_rx, &mut tally).await;
        drop(job_tx);

        let dispatched = read.as_ref().map_or(0, |counts| counts.dispatched);
        if read.is_ok() {
            while tally.completed() < dispatched {
                match done_rx.recv().await {
                    Some(completion) => tally.record(completion),
                    None => break,
                }
            }
        }
        let elapsed = start.elapsed();

        stop_tx.send_replace(true);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }
        let counts = read?;

        if tally.completed() < dispatched {
            warn!(
                missing = dispatched - tally.completed(),
                "Some requests never reported completion"
            );
        }

        let stats = tally.finish(counts.dispatched, counts.skipped, elapsed);
        info!(
            total = stats.total_requests,
            failed = stats.failed,
            skipped = stats.skipped_lines,
            total_time_ms = stats.total_time_ms,
            "Benchmark finished"
        );
        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DispatchCounts {
    dispatched: u64,
    skipped: u64,
}

/// Parse `input` line by line and queue one job per coordinate.
///
/// Completions that are already in are folded into `tally` as we go so the
/// progress log keeps up with the run.
async fn dispatch<R>(
    input: R,
    jobs: &mpsc::Sender<Job>,
    done: &mut mpsc::UnboundedReceiver<Completion>,
    tally: &mut Tally,
) -> Result<DispatchCounts, BenchError>
where
    R: AsyncBufRead + Unpin,
{
    let mut counts = DispatchCounts::default();
    let mut lines = input.split(b'\n');
    let mut line_no = 0u64;

    while let Some(raw) = lines.next_segment().await? {
        line_no += 1;
        let line = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
        if line.trim_ascii().is_empty() {
            continue;
        }
        let event = match parse_record(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed line");
                counts.skipped += 1;
                continue;
            }
        };

        counts.dispatched += 1;
        let job = Job {
            num: counts.dispatched,
            event,
        };
        if jobs.send(job).await.is_err() {
            return Err(BenchError::WorkersExited);
        }
        while let Ok(completion) = done.try_recv() {
            tally.record(completion);
        }
    }
    Ok(counts)
}

/// Reports a completion when dropped, so a failed or panicking request is
/// still accounted for.
struct CompletionGuard {
    num: u64,
    started: Instant,
    succeeded: bool,
    done: mpsc::UnboundedSender<Completion>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.done.send(Completion {
            num: self.num,
            succeeded: self.succeeded,
            latency: self.started.elapsed(),
        });
    }
}

async fn worker<T: Target>(
    id: usize,
    target: Arc<T>,
    jobs: JobQueue,
    done: mpsc::UnboundedSender<Completion>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let job = tokio::select! {
            biased;

            _ = stopped(&mut stop) => break,

            job = next_job(&jobs) => match job {
                Some(job) => job,
                None => break,
            },
        };

        let mut guard = CompletionGuard {
            num: job.num,
            started: Instant::now(),
            succeeded: false,
            done: done.clone(),
        };
        match target.send(&job.event).await {
            Ok(()) => guard.succeeded = true,
            Err(e) => warn!(worker = id, request = job.num, error = %e, "Request failed"),
        }
    }
    debug!(worker = id, "Worker stopped");
}

async fn next_job(jobs: &JobQueue) -> Option<Job> {
    jobs.lock().await.recv().await
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carto_sdk::client::ClientError;
    use carto_sdk::objects::ServerInfo;
    use std::fmt::Write as _;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    const REQUEST_TIME: Duration = Duration::from_millis(10);

    fn rejected(body: &str) -> RequestError {
        ClientError::Api {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: body.into(),
        }
        .into()
    }

    /// Counts requests and in-flight concurrency; fails or panics on
    /// selected latitudes.
    #[derive(Default)]
    struct FakeTarget {
        limit: usize,
        sent: AtomicU64,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_every: Option<u64>,
        panic_on: Option<f32>,
    }

    impl FakeTarget {
        fn new(limit: usize) -> Self {
            Self {
                limit,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Target for FakeTarget {
        fn endpoint(&self) -> String {
            "fake://target/geo".into()
        }

        async fn info(&self) -> Result<ServerInfo, RequestError> {
            Ok(serde_json::from_value(serde_json::json!({
                "protocol": "HTTP/1.1",
                "concurrentRequestsServer": self.limit,
            }))
            .unwrap())
        }

        async fn send(&self, event: &CoordinateEvent) -> Result<(), RequestError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(REQUEST_TIME).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.sent.fetch_add(1, Ordering::SeqCst);

            if self.panic_on == Some(event.lat) {
                panic!("boom");
            }
            match self.fail_every {
                Some(n) if (event.lat as u64) % n == 0 => Err(rejected("busy")),
                _ => Ok(()),
            }
        }
    }

    fn lines(n: u64) -> String {
        let mut input = String::new();
        for i in 1..=n {
            writeln!(input, "{i},{},City {i}", i % 180).unwrap();
        }
        input
    }

    #[tokio::test(start_paused = true)]
    async fn test_thousand_lines_ten_workers() {
        let driver = BenchmarkDriver::connect(FakeTarget::new(20)).await.unwrap();
        assert_eq!(driver.config().concurrent_requests_client, 10);

        let input = lines(1000);
        let stats = driver.run(input.as_bytes()).await.unwrap();

        assert_eq!(stats.total_requests, 1000);
        assert_eq!(stats.succeeded, 1000);
        assert_eq!(stats.failed, 0);
        assert_eq!(driver.target.sent.load(Ordering::SeqCst), 1000);
        assert!(driver.target.peak.load(Ordering::SeqCst) <= 10);
        assert!(stats.max_request_micros >= REQUEST_TIME.as_micros() as u64);
        assert!(stats.mean_request_micros < REQUEST_TIME.as_micros() as u64 * 2);

        let avg = stats.avg_time_micros.unwrap();
        let expected = stats.total_time_ms * 1000 / 1000;
        assert!(avg.abs_diff(expected) <= 1, "avg {avg}, expected {expected}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_not_retried() {
        let target = FakeTarget {
            fail_every: Some(4),
            ..FakeTarget::new(8)
        };
        let driver = BenchmarkDriver::connect(target).await.unwrap();

        let stats = driver.run(lines(100).as_bytes()).await.unwrap();

        assert_eq!(stats.total_requests, 100);
        assert_eq!(stats.failed, 25);
        assert_eq!(stats.succeeded, 75);
        assert_eq!(driver.target.sent.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_lines_are_skipped() {
        let driver = BenchmarkDriver::connect(FakeTarget::new(4)).await.unwrap();
        let input = "1,2\nnot a coordinate\n\n3,x\n5,6\n";

        let stats = driver.run(input.as_bytes()).await.unwrap();

        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.skipped_lines, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_utf8_line_is_skipped() {
        let driver = BenchmarkDriver::connect(FakeTarget::new(4)).await.unwrap();
        let input: &[u8] = b"1,2\r\n\xff\xfe,3\r\n5,6";

        let stats = driver.run(input).await.unwrap();

        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.skipped_lines, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input() {
        let driver = BenchmarkDriver::connect(FakeTarget::new(4)).await.unwrap();

        let stats = driver.run(&b""[..]).await.unwrap();

        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.avg_time_micros, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_request_still_completes() {
        let target = FakeTarget {
            panic_on: Some(7.0),
            ..FakeTarget::new(6)
        };
        let driver = BenchmarkDriver::connect(target).await.unwrap();

        let stats = driver.run(lines(30).as_bytes()).await.unwrap();

        assert_eq!(stats.total_requests, 30);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 29);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_fatal() {
        struct Down;

        #[async_trait]
        impl Target for Down {
            fn endpoint(&self) -> String {
                "down".into()
            }
            async fn info(&self) -> Result<ServerInfo, RequestError> {
                Err(rejected("down for maintenance"))
            }
            async fn send(&self, _: &CoordinateEvent) -> Result<(), RequestError> {
                unreachable!()
            }
        }

        let err = BenchmarkDriver::connect(Down).await.err().unwrap();
        assert!(matches!(err, BenchError::Info(_)));
    }
}
