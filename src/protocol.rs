//! Wire protocol for the lobby room service.
//!
//! Messages are JSON text frames shaped as `{"type": "...", "data": {...}}`.
//! Type tags are `snake_case`; payload fields are `camelCase` to match the
//! browser lobby that speaks the same protocol.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque room identifier assigned by the room service.
pub type RoomId = String;

/// Opaque per-membership user identifier assigned by the room service.
pub type UserId = String;

/// Maximum number of connections a public room accepts.
pub const ROOM_CAPACITY: u32 = 50;

// ── Room listing ────────────────────────────────────────────────────

/// One row of the public room listing.
///
/// Listing data is display-only telemetry: the client never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub room_name: String,
    #[serde(rename = "totalConns")]
    pub total_connections: u32,
}

impl RoomSummary {
    /// Returns `true` once the room has reached [`ROOM_CAPACITY`].
    pub fn is_full(&self) -> bool {
        self.total_connections >= ROOM_CAPACITY
    }
}

/// Payload of the `/rooms` listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomsResponse {
    #[serde(default)]
    pub rooms: Vec<RoomSummary>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to become a member of a room under the given display name.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId, user_name: String },
    /// Give up the membership identified by `user_id`.
    #[serde(rename_all = "camelCase")]
    LeaveRoom { user_id: UserId },
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The server accepted a join and assigned a membership id.
    #[serde(rename_all = "camelCase")]
    RoomJoined { user_id: UserId, room_id: RoomId },
    /// The membership ended, either on request or by the server.
    #[serde(rename_all = "camelCase")]
    RoomLeft { user_id: UserId },
    /// The server rejected the last request.
    Error { message: String },
}
