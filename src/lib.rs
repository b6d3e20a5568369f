//! # Lobby Client
//!
//! Transport-agnostic async client for a chat-room lobby: join a public
//! room, leave it, and keep UI state consistent with what the room service
//! confirmed.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any backend
//! - **Single writer**: one session task owns the [`Coordinator`] and is the
//!   only writer of the [`AppStore`]; the UI reads snapshots or subscribes
//! - **Identity fallback**: a fresh credential's username, or a guest name
//! - **WebSocket built-in**: the default `transport-websocket` feature
//!   provides `WebSocketTransport`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> Result<(), lobby_client::LobbyError> {
//! use lobby_client::{AppStore, IdentityResolver, LobbyClient, LobbyConfig, WebSocketTransport};
//!
//! let transport = WebSocketTransport::connect_lobby("ws://localhost:8080").await?;
//! let store = AppStore::new();
//! let mut client = LobbyClient::start(
//!     transport,
//!     IdentityResolver::anonymous(),
//!     store.clone(),
//!     LobbyConfig::default(),
//! );
//!
//! client.join_room("general")?;
//! // ... render from `store.get()` / `store.subscribe()` ...
//! client.leave_room()?;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod freshness;
pub mod identity;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{LobbyClient, LobbyConfig};
pub use coordinator::{Coordinator, JoinOutcome, LeaveOutcome, SessionPhase};
pub use debounce::Debouncer;
pub use error::LobbyError;
pub use freshness::is_expired;
pub use identity::{
    resolve_username, AccessTokenCredentials, Credential, CredentialPayload, CredentialSource,
    IdentityResolver, StaticCredentials,
};
pub use protocol::{ClientMessage, RoomSummary, RoomsResponse, ServerMessage, ROOM_CAPACITY};
pub use store::{AppState, AppStore, Session};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
