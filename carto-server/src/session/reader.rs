//! Receive half of a session.

use axum::extract::ws::{Message, close_code};
use futures_util::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, trace, warn};

use super::{CloseGuard, CloseReason, SessionShared, closing};

/// Read frames until the peer goes away, stops answering pings, or the
/// session closes for another reason.
///
/// Inbound payloads carry no meaning; the loop exists to observe pongs and
/// closure. Only a pong moves the read deadline forward.
pub(super) async fn receive_loop<St, E>(shared: Arc<SessionShared>, mut stream: St, pong_wait: Duration)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let _guard = CloseGuard(&shared);
    let mut closing_signal = shared.closing_signal();
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let frame = tokio::select! {
            biased;

            _ = closing(&mut closing_signal) => break,

            frame = timeout_at(deadline, stream.next()) => frame,
        };

        match frame {
            Err(_elapsed) => {
                debug!(?pong_wait, "No pong within deadline");
                shared.close(CloseReason::LivenessTimeout);
                break;
            }
            Ok(None) => {
                shared.close(CloseReason::PeerClosed);
                break;
            }
            Ok(Some(Err(e))) => {
                error!(error = %e, "Unexpected connection error");
                shared.close(CloseReason::ConnectionError);
                break;
            }
            Ok(Some(Ok(Message::Pong(_)))) => {
                deadline = Instant::now() + pong_wait;
                trace!("Pong received");
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                match frame {
                    Some(f) if f.code != close_code::NORMAL && f.code != close_code::AWAY => {
                        warn!(code = f.code, reason = %f.reason, "Peer closed unexpectedly");
                    }
                    _ => debug!("Peer closed"),
                }
                shared.close(CloseReason::PeerClosed);
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                trace!(payload = %normalize(text.as_bytes()), "Ignoring inbound text");
            }
            Ok(Some(Ok(Message::Binary(data)))) => {
                trace!(payload = %normalize(&data), "Ignoring inbound binary");
            }
            // Answered by the WebSocket layer.
            Ok(Some(Ok(Message::Ping(_)))) => {}
        }
    }
}

/// Collapse newlines to spaces and trim surrounding whitespace.
pub(super) fn normalize(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).replace('\n', " ").trim().to_string()
}
