//! Subscriber sessions.
//!
//! One [`Session`] per accepted WebSocket connection. A session runs two
//! tasks: a receive loop that watches the peer for pongs, chatter and
//! closure, and a send loop that forwards published coordinates and pings
//! the peer on a fixed period.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──(receive error | write failure | liveness timeout | shutdown)──▶ Closing ──(both loops exited)──▶ Closed
//! ```
//!
//! The first trigger wins and is recorded as the [`CloseReason`]; later
//! triggers are no-ops. Entering `Closing` wakes both loops, so neither is
//! left blocked on I/O once closure has begun.

mod reader;
mod writer;

pub use writer::WriteError;

use axum::extract::ws::{Message, WebSocket};
use carto_core::bus::{EventBus, Topic};
use carto_core::config::LivenessConfig;
use carto_sdk::objects::CoordinateEvent;
use futures_util::{Sink, Stream, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info_span, trace};
use uuid::Uuid;

/// Lifecycle phase of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// Why a session left the `Open` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the connection failed.
    ConnectionError,
    /// No pong arrived within `pong_wait`.
    LivenessTimeout,
    /// A coordinate could not be written because the peer is unreachable.
    WriteFailed,
    /// A ping could not be written.
    PingFailed,
    /// The event bus went away.
    BusClosed,
    /// The server is shutting down.
    ServerShutdown,
    /// A session task ended without recording a reason (e.g. it panicked).
    Aborted,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::ConnectionError => "connection error",
            CloseReason::LivenessTimeout => "liveness timeout",
            CloseReason::WriteFailed => "write failed",
            CloseReason::PingFailed => "ping failed",
            CloseReason::BusClosed => "bus closed",
            CloseReason::ServerShutdown => "server shutdown",
            CloseReason::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// State shared by a session's two loops.
pub(crate) struct SessionShared {
    id: Uuid,
    state: AtomicU8,
    reason: OnceLock<CloseReason>,
    closing_tx: watch::Sender<bool>,
}

impl SessionShared {
    fn new() -> Self {
        let (closing_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(OPEN),
            reason: OnceLock::new(),
            closing_tx,
        }
    }

    /// Move from `Open` to `Closing`.
    ///
    /// Returns `true` for the call that performed the transition.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(
                session = %self.id,
                state = ?self.state(),
                %reason,
                "Close already underway"
            );
            return false;
        }
        let _ = self.reason.set(reason);
        self.closing_tx.send_replace(true);
        debug!(session = %self.id, %reason, "Session closing");
        true
    }

    pub(crate) fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            OPEN => SessionState::Open,
            CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    fn reason(&self) -> CloseReason {
        self.reason.get().copied().unwrap_or(CloseReason::Aborted)
    }

    pub(crate) fn closing_signal(&self) -> watch::Receiver<bool> {
        self.closing_tx.subscribe()
    }
}

/// Resolves once the session has left `Open`.
pub(crate) async fn closing(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|closing| *closing).await;
}

/// Closes the session when a loop unwinds without doing so itself.
pub(crate) struct CloseGuard<'a>(pub(crate) &'a SessionShared);

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        self.0.close(CloseReason::Aborted);
    }
}

/// A subscriber connection.
pub struct Session {
    shared: Arc<SessionShared>,
    liveness: LivenessConfig,
}

impl Session {
    pub fn new(liveness: LivenessConfig) -> Self {
        Self {
            shared: Arc::new(SessionShared::new()),
            liveness,
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Drive an upgraded WebSocket until the session is closed.
    pub async fn run(
        self,
        socket: WebSocket,
        bus: EventBus<CoordinateEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> CloseReason {
        let (sink, stream) = socket.split();
        self.run_split(sink, stream, bus, shutdown).await
    }

    /// Drive a connection given as separate send and receive halves.
    ///
    /// Subscribes to [`Topic::LOCATIONS`] before returning control to the
    /// runtime, spawns both loops and waits for both to exit.
    pub async fn run_split<K, St, E>(
        self,
        sink: K,
        stream: St,
        bus: EventBus<CoordinateEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> CloseReason
    where
        K: Sink<Message> + Unpin + Send + 'static,
        K::Error: std::error::Error + Send + Sync + 'static,
        St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let span = info_span!("session", id = %self.shared.id);
        let subscription = bus.subscribe(&Topic::LOCATIONS);
        debug!(
            parent: &span,
            listeners = bus.count(&Topic::LOCATIONS),
            "Session open"
        );

        let receiving = tokio::spawn(
            reader::receive_loop(self.shared.clone(), stream, self.liveness.pong_wait)
                .instrument(span.clone()),
        );
        let sending = tokio::spawn(
            writer::send_loop(
                self.shared.clone(),
                sink,
                subscription,
                bus,
                self.liveness,
                shutdown,
            )
            .instrument(span.clone()),
        );

        let (received, sent) = tokio::join!(receiving, sending);
        for result in [received, sent] {
            if let Err(e) = result {
                error!(parent: &span, error = %e, "Session task failed");
            }
        }

        // No-op unless a task died before recording a reason.
        self.shared.close(CloseReason::Aborted);
        self.shared.state.store(CLOSED, Ordering::Release);

        let reason = self.shared.reason();
        debug!(parent: &span, %reason, "Session closed");
        reason
    }
}
