//! Transport abstraction for the lobby room service.
//!
//! The [`Transport`] trait is a bidirectional JSON text channel between the
//! client and the room service. Framing is the implementation's business
//! (WebSocket frames, length-prefixed TCP, an in-process channel in tests).
//!
//! Connecting is not part of the trait: build a connected transport, then
//! hand it to `LobbyClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lobby_client::error::LobbyError;
//! use lobby_client::transport::Transport;
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     outgoing: mpsc::UnboundedSender<String>,
//!     incoming: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, message: String) -> Result<(), LobbyError> {
//!         self.outgoing
//!             .send(message)
//!             .map_err(|e| LobbyError::TransportSend(e.to_string()))
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
//!         self.incoming.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), LobbyError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::LobbyError;

/// A bidirectional text message transport.
///
/// Each [`send`](Transport::send) transmits one complete JSON message and each
/// [`recv`](Transport::recv) yields one. Sends are best-effort: an `Ok` means
/// the message was handed to the connection, not that the room service acted
/// on it.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session task
/// polls it inside `tokio::select!`. Channel-backed implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the room service.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::TransportSend`] or [`LobbyError::TransportClosed`]
    /// if the message could not be handed to the connection.
    async fn send(&mut self, message: String) -> Result<(), LobbyError>;

    /// Receive the next JSON text message.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, LobbyError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), LobbyError>;
}
