//! Send half of a session.

use axum::extract::ws::Message;
use bytes::Bytes;
use carto_core::bus::{EventBus, Subscription};
use carto_core::config::LivenessConfig;
use carto_sdk::objects::CoordinateEvent;
use futures_util::{Sink, SinkExt};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, warn};

use super::{CloseGuard, CloseReason, SessionShared, closing};

type BoxError = Box<dyn StdError + Send + Sync>;

/// A failed write to the peer.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The write did not finish within `write_wait`.
    #[error("write timed out after {0:?}")]
    TimedOut(Duration),

    /// The transport failed or the connection is already closed; the peer
    /// is gone.
    #[error("connection lost: {0}")]
    Network(BoxError),

    /// Any other failure to deliver this frame.
    #[error("write failed: {0}")]
    Transient(BoxError),

    #[error("failed to encode coordinate: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WriteError {
    /// Whether the failure means the peer can no longer be reached.
    pub fn is_network(&self) -> bool {
        matches!(self, WriteError::TimedOut(_) | WriteError::Network(_))
    }

    pub(super) fn classify<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        if peer_gone(&err) {
            WriteError::Network(Box::new(err))
        } else {
            WriteError::Transient(Box::new(err))
        }
    }
}

/// Walks the source chain for an I/O failure or a WebSocket that has
/// already been closed.
fn peer_gone(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<std::io::Error>() {
            return true;
        }
        if let Some(ws) = e.downcast_ref::<tungstenite::Error>() {
            return matches!(
                ws,
                tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Io(_)
            );
        }
        current = e.source();
    }
    false
}

/// Forward published coordinates to the peer and ping it every
/// `ping_period`, until a write fails or the session closes.
///
/// On every exit path the subscription is released and the connection is
/// closed once, bounded by `write_wait`.
pub(super) async fn send_loop<K>(
    shared: Arc<SessionShared>,
    mut sink: K,
    mut subscription: Subscription<CoordinateEvent>,
    bus: EventBus<CoordinateEvent>,
    liveness: LivenessConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    K: Sink<Message> + Unpin,
    K::Error: StdError + Send + Sync + 'static,
{
    let guard = CloseGuard(&shared);
    let mut closing_signal = shared.closing_signal();
    let write_wait = liveness.write_wait;
    let ping_period = liveness.ping_period();
    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = closing(&mut closing_signal) => break,

            _ = shutdown_requested(&mut shutdown) => {
                shared.close(CloseReason::ServerShutdown);
                break;
            }

            event = subscription.recv() => {
                let Some(event) = event else {
                    shared.close(CloseReason::BusClosed);
                    break;
                };
                let written = tokio::select! {
                    biased;
                    _ = closing(&mut closing_signal) => break,
                    written = write_event(&mut sink, &event, write_wait) => written,
                };
                match written {
                    Ok(()) => {}
                    Err(e) if e.is_network() => {
                        debug!(error = %e, "Peer unreachable, closing");
                        shared.close(CloseReason::WriteFailed);
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to deliver coordinate, continuing");
                    }
                }
            }

            _ = ticker.tick() => {
                let pinged = tokio::select! {
                    biased;
                    _ = closing(&mut closing_signal) => break,
                    pinged = write_frame(&mut sink, Message::Ping(Bytes::new()), write_wait) => pinged,
                };
                if let Err(e) = pinged {
                    debug!(error = %e, "Ping failed, closing");
                    shared.close(CloseReason::PingFailed);
                    break;
                }
            }
        }
    }

    bus.unsubscribe(subscription);
    if timeout(write_wait, sink.close()).await.is_err() {
        debug!("Connection close timed out");
    }
    drop(guard);
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stopping| *stopping).await.is_err() {
        // Nobody is left to request a shutdown.
        std::future::pending::<()>().await;
    }
}

async fn write_event<K>(
    sink: &mut K,
    event: &CoordinateEvent,
    write_wait: Duration,
) -> Result<(), WriteError>
where
    K: Sink<Message> + Unpin,
    K::Error: StdError + Send + Sync + 'static,
{
    let json = serde_json::to_string(event)?;
    write_frame(sink, Message::Text(json.into()), write_wait).await
}

async fn write_frame<K>(sink: &mut K, frame: Message, write_wait: Duration) -> Result<(), WriteError>
where
    K: Sink<Message> + Unpin,
    K::Error: StdError + Send + Sync + 'static,
{
    match timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::classify(e)),
        Err(_) => Err(WriteError::TimedOut(write_wait)),
    }
}
