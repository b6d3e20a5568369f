//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries lobby protocol messages as WebSocket text
//! frames. `ws://` and `wss://` are both accepted; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Only available with the `transport-websocket` feature (on by default).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::LobbyError;
use crate::transport::Transport;

/// Path the room service exposes its real-time endpoint on.
pub const LOBBY_WS_PATH: &str = "/ws";

/// The underlying WebSocket stream type.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over a single WebSocket connection.
///
/// `recv` is cancel-safe: a dropped `recv` future never consumes a frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to `url` as given.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Io`] if the URL is invalid or the handshake
    /// fails. I/O error kinds are preserved; other failures map to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, LobbyError> {
        debug!(url = %url, "connecting to lobby WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            LobbyError::Io(std::io::Error::new(kind, e))
        })?;

        info!(url = %url, "lobby WebSocket connected");
        Ok(Self::from_stream(stream))
    }

    /// Connect to the room service's real-time endpoint under `base_url`,
    /// e.g. `ws://localhost:8080` becomes `ws://localhost:8080/ws`.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_lobby(base_url: &str) -> Result<Self, LobbyError> {
        Self::connect(&lobby_endpoint(base_url)).await
    }

    /// [`connect`](Self::connect) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Timeout`] if the deadline elapses first.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, LobbyError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| LobbyError::Timeout)?
    }

    /// Wrap a stream that was connected elsewhere (custom TLS, headers, proxy).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

/// Join `base_url` and [`LOBBY_WS_PATH`] without doubling slashes.
pub fn lobby_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(LOBBY_WS_PATH) {
        base.to_string()
    } else {
        format!("{base}{LOBBY_WS_PATH}")
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        if self.closed {
            return Err(LobbyError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(LobbyError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "lobby WebSocket closed by server");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(data) => {
                    warn!(len = data.len(), "skipping binary frame on lobby socket");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }
}
