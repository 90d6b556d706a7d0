//! Live coordinate subscription over WebSocket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::ClientError;
use crate::objects::CoordinateEvent;

/// An open `GET /ws` subscription.
///
/// Pings from the server are answered while [`next`](Self::next) is being
/// polled; a subscriber that stops reading stops answering and will be
/// reclaimed by the server's liveness timeout.
pub struct LocationStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl LocationStream {
    pub(super) async fn connect(url: &str) -> Result<Self, ClientError> {
        let (socket, _response) = connect_async(url).await?;
        Ok(Self { socket })
    }

    /// Wait for the next pushed coordinate.
    ///
    /// Returns `None` once the server closes the connection.
    pub async fn next(&mut self) -> Option<Result<CoordinateEvent, ClientError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(ClientError::Json));
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Send a close frame and wait for the server to acknowledge it.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        while let Some(msg) = self.socket.next().await {
            if msg.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Send a text frame. The server ignores the content; useful to prove
    /// the receive path tolerates client chatter.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.socket.send(Message::Text(text.into())).await?;
        Ok(())
    }
}
