//! Room session coordinator.
//!
//! [`Coordinator`] owns the single local session slot and is the only writer
//! of the [`AppStore`]. It moves through
//! `Idle → Joining → Active → Leaving → Idle`:
//!
//! - A join sends `join_room` and, once the send succeeds, optimistically
//!   sets the username and shows the console (`Joining`). The session itself
//!   only exists after the server's `room_joined` confirmation (`Active`).
//! - A leave from `Active` sends `leave_room` and resets the store. A leave
//!   while still `Joining` cancels the join locally; if the server confirms
//!   it afterwards, the stray membership is left again straight away.
//! - Transport failures are logged and swallowed. Nothing is retried.

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::protocol::{ClientMessage, RoomId, ServerMessage, UserId};
use crate::store::{Action, AppStore, Session};
use crate::transport::Transport;

/// Where the local session slot currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No membership and none requested.
    Idle,
    /// `join_room` was sent; waiting for the server to confirm.
    Joining { room_id: RoomId, username: String },
    /// The server confirmed the membership.
    Active(Session),
    /// `leave_room` is being sent for this membership.
    Leaving { user_id: UserId },
}

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// `join_room` was sent and the optimistic update applied.
    Requested,
    /// Already joining or in this room; the UI shows "You are here".
    AlreadyHere,
    /// Joining or in a different room. Leave first.
    InAnotherRoom,
    /// The transport refused the request; nothing changed.
    TransportFailed,
}

/// Result of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// `leave_room` was sent (or attempted) and the store reset.
    Left,
    /// A pending join was abandoned before the server confirmed it.
    JoinCancelled,
    /// Nothing to leave; the transport was not touched.
    NoActiveSession,
}

/// Orchestrates join and leave against a [`Transport`] and keeps the
/// [`AppStore`] consistent with server-confirmed membership.
pub struct Coordinator<T> {
    transport: T,
    store: AppStore,
    identity: IdentityResolver,
    phase: SessionPhase,
}

impl<T: Transport> Coordinator<T> {
    /// Create an idle coordinator.
    pub fn new(transport: T, identity: IdentityResolver, store: AppStore) -> Self {
        Self {
            transport,
            store,
            identity,
            phase: SessionPhase::Idle,
        }
    }

    /// Current phase of the session slot.
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// The store this coordinator writes to.
    pub fn store(&self) -> &AppStore {
        &self.store
    }

    /// Request membership of `room_id`.
    pub async fn join(&mut self, room_id: RoomId) -> JoinOutcome {
        match &self.phase {
            SessionPhase::Idle => {}
            SessionPhase::Joining { room_id: current, .. } if *current == room_id => {
                debug!(room_id = %room_id, "join already pending for this room");
                return JoinOutcome::AlreadyHere;
            }
            SessionPhase::Active(session) if session.room_id == room_id => {
                debug!(room_id = %room_id, "already in this room");
                return JoinOutcome::AlreadyHere;
            }
            other => {
                warn!(room_id = %room_id, phase = ?other, "join rejected: leave the current room first");
                return JoinOutcome::InAnotherRoom;
            }
        }

        let username = self.identity.resolve_username();
        let request = ClientMessage::JoinRoom {
            room_id: room_id.clone(),
            user_name: username.clone(),
        };
        if let Err(e) = self.send(&request).await {
            error!(room_id = %room_id, "couldn't join room: {e}");
            return JoinOutcome::TransportFailed;
        }

        self.store.dispatch(Action::SetUsername(username.clone()));
        self.store.dispatch(Action::ShowConsole);
        debug!(room_id = %room_id, username = %username, "state: joining");
        self.phase = SessionPhase::Joining { room_id, username };
        JoinOutcome::Requested
    }

    /// Give up the current membership, if there is one.
    pub async fn leave(&mut self) -> LeaveOutcome {
        match std::mem::replace(&mut self.phase, SessionPhase::Idle) {
            SessionPhase::Active(session) => {
                self.phase = SessionPhase::Leaving {
                    user_id: session.user_id.clone(),
                };
                let request = ClientMessage::LeaveRoom {
                    user_id: session.user_id.clone(),
                };
                if let Err(e) = self.send(&request).await {
                    error!(user_id = %session.user_id, "couldn't send leave request: {e}");
                }
                self.reset();
                debug!(room_id = %session.room_id, "state: left room");
                LeaveOutcome::Left
            }
            SessionPhase::Joining { room_id, .. } => {
                self.reset();
                debug!(room_id = %room_id, "state: pending join cancelled");
                LeaveOutcome::JoinCancelled
            }
            idle @ (SessionPhase::Idle | SessionPhase::Leaving { .. }) => {
                self.phase = idle;
                debug!("leave ignored: no active session");
                LeaveOutcome::NoActiveSession
            }
        }
    }

    /// Reconcile local state with a message from the room service.
    pub async fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::RoomJoined { user_id, room_id } => {
                self.on_room_joined(user_id, room_id).await;
            }
            ServerMessage::RoomLeft { user_id } => match &self.phase {
                SessionPhase::Active(session) if session.user_id == user_id => {
                    debug!(room_id = %session.room_id, "state: membership ended by server");
                    self.reset();
                }
                _ => debug!(user_id = %user_id, "ignoring room_left for unknown membership"),
            },
            ServerMessage::Error { message } => {
                if let SessionPhase::Joining { room_id, .. } = &self.phase {
                    error!(room_id = %room_id, "couldn't join room: {message}");
                    self.reset();
                } else {
                    warn!("room service error: {message}");
                }
            }
        }
    }

    /// Parse and apply one raw message. Malformed input is logged and dropped.
    pub async fn handle_incoming(&mut self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => self.handle_server_message(message).await,
            Err(e) => warn!(
                len = text.len(),
                "failed to deserialize server message: {e} (starts with: {:?})",
                preview(text)
            ),
        }
    }

    /// The connection is gone: whatever membership existed is over.
    pub fn handle_disconnect(&mut self) {
        if self.phase != SessionPhase::Idle {
            debug!(phase = ?self.phase, "state: session dropped by disconnect");
            self.reset();
        }
    }

    /// Receive the next raw message from the transport.
    pub async fn recv(&mut self) -> Option<Result<String>> {
        self.transport.recv().await
    }

    /// Best-effort leave, then close the transport and reset local state.
    pub async fn close(&mut self) {
        if matches!(self.phase, SessionPhase::Active(_)) {
            self.leave().await;
        }
        if let Err(e) = self.transport.close().await {
            debug!("transport close failed: {e}");
        }
        self.handle_disconnect();
    }

    async fn on_room_joined(&mut self, user_id: UserId, room_id: RoomId) {
        match &self.phase {
            SessionPhase::Joining {
                room_id: pending,
                username,
            } if *pending == room_id => {
                let session = Session {
                    user_id,
                    room_id,
                    username: username.clone(),
                    joined_at_epoch_ms: self.identity.now_millis(),
                };
                debug!(
                    room_id = %session.room_id,
                    user_id = %session.user_id,
                    "state: joined room"
                );
                self.store.dispatch(Action::SetSession(session.clone()));
                self.phase = SessionPhase::Active(session);
            }
            SessionPhase::Active(session)
                if session.user_id == user_id && session.room_id == room_id =>
            {
                debug!(room_id = %room_id, "duplicate join confirmation");
            }
            _ => {
                warn!(
                    room_id = %room_id,
                    user_id = %user_id,
                    "stray membership confirmed, leaving it"
                );
                if let Err(e) = self.send(&ClientMessage::LeaveRoom { user_id }).await {
                    error!("couldn't leave stray membership: {e}");
                }
            }
        }
    }

    fn reset(&mut self) {
        self.store.dispatch(Action::SetDefaultState);
        self.phase = SessionPhase::Idle;
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.transport.send(json).await
    }
}

/// Longest prefix of a malformed frame echoed into the logs.
const MAX_LOGGED_FRAME_CHARS: usize = 64;

fn preview(text: &str) -> &str {
    match text.char_indices().nth(MAX_LOGGED_FRAME_CHARS) {
        Some((end, _)) => text.get(..end).unwrap_or(text),
        None => text,
    }
}

impl<T> std::fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::LobbyError;
    use crate::freshness::FixedClock;
    use crate::identity::StaticCredentials;
    use crate::store::AppState;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex as StdMutex};

    const NOW: i64 = 1_700_000_000_000;

    // ── Mock transport ──────────────────────────────────────────────

    /// Records sent messages; optionally fails every send.
    struct RecordingTransport {
        sent: Arc<StdMutex<Vec<ClientMessage>>>,
        fail_sends: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), LobbyError> {
            if self.fail_sends {
                return Err(LobbyError::TransportSend("connection refused".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(serde_json::from_str(&message).unwrap());
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, LobbyError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), LobbyError> {
            Ok(())
        }
    }

    fn coordinator(
        identity: IdentityResolver,
        fail_sends: bool,
    ) -> (
        Coordinator<RecordingTransport>,
        Arc<StdMutex<Vec<ClientMessage>>>,
    ) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = RecordingTransport {
            sent: Arc::clone(&sent),
            fail_sends,
        };
        (
            Coordinator::new(transport, identity, AppStore::new()),
            sent,
        )
    }

    fn alice() -> IdentityResolver {
        IdentityResolver::new(StaticCredentials::with_username("alice", NOW - 1000))
            .with_clock(FixedClock::new(NOW))
    }

    fn joined(user_id: &str, room_id: &str) -> ServerMessage {
        ServerMessage::RoomJoined {
            user_id: user_id.into(),
            room_id: room_id.into(),
        }
    }

    async fn active_in_r1() -> (
        Coordinator<RecordingTransport>,
        Arc<StdMutex<Vec<ClientMessage>>>,
    ) {
        let (mut c, sent) = coordinator(alice(), false);
        assert_eq!(c.join("r1".into()).await, JoinOutcome::Requested);
        c.handle_server_message(joined("u1", "r1")).await;
        (c, sent)
    }

    // ── Join ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn join_sends_request_and_applies_optimistic_update() {
        let (mut c, sent) = coordinator(alice(), false);

        assert_eq!(c.join("r1".into()).await, JoinOutcome::Requested);

        assert_eq!(
            *sent.lock().unwrap(),
            vec![ClientMessage::JoinRoom {
                room_id: "r1".into(),
                user_name: "alice".into()
            }]
        );
        let state = c.store().get();
        assert_eq!(state.username.as_deref(), Some("alice"));
        assert!(state.console_visible);
        assert!(state.session.is_none());
        assert!(matches!(c.phase(), SessionPhase::Joining { .. }));
    }

    #[tokio::test]
    async fn confirmation_creates_session() {
        let (c, _sent) = active_in_r1().await;

        let SessionPhase::Active(session) = c.phase() else {
            panic!("expected Active, got {:?}", c.phase());
        };
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.username, "alice");
        assert_eq!(session.joined_at_epoch_ms, NOW);
        assert_eq!(c.store().user_id().as_deref(), Some("u1"));
        assert!(c.store().is_current_room("r1"));
    }

    #[tokio::test]
    async fn failed_join_leaves_store_untouched() {
        let (mut c, _sent) = coordinator(alice(), true);

        assert_eq!(c.join("r1".into()).await, JoinOutcome::TransportFailed);
        assert_eq!(c.store().get(), AppState::default());
        assert_eq!(*c.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn duplicate_join_is_a_no_op() {
        let (mut c, sent) = coordinator(alice(), false);
        c.join("r1".into()).await;
        assert_eq!(c.join("r1".into()).await, JoinOutcome::AlreadyHere);

        c.handle_server_message(joined("u1", "r1")).await;
        assert_eq!(c.join("r1".into()).await, JoinOutcome::AlreadyHere);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn join_elsewhere_while_active_is_rejected() {
        let (mut c, sent) = active_in_r1().await;

        assert_eq!(c.join("r2".into()).await, JoinOutcome::InAnotherRoom);
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert!(c.store().is_current_room("r1"));
    }

    #[tokio::test]
    async fn server_error_while_joining_rolls_back() {
        let (mut c, _sent) = coordinator(alice(), false);
        c.join("r1".into()).await;

        c.handle_server_message(ServerMessage::Error {
            message: "room is full".into(),
        })
        .await;

        assert_eq!(c.store().get(), AppState::default());
        assert_eq!(*c.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn server_error_while_active_is_only_logged() {
        let (mut c, _sent) = active_in_r1().await;
        c.handle_server_message(ServerMessage::Error {
            message: "rate limited".into(),
        })
        .await;
        assert!(matches!(c.phase(), SessionPhase::Active(_)));
    }

    // ── Leave ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn leave_sends_user_id_and_resets() {
        let (mut c, sent) = active_in_r1().await;

        assert_eq!(c.leave().await, LeaveOutcome::Left);

        assert_eq!(
            sent.lock().unwrap().last(),
            Some(&ClientMessage::LeaveRoom {
                user_id: "u1".into()
            })
        );
        assert_eq!(c.store().get(), AppState::default());
        assert_eq!(*c.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn leave_without_session_is_a_no_op() {
        let (mut c, sent) = coordinator(alice(), false);

        assert_eq!(c.leave().await, LeaveOutcome::NoActiveSession);
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(c.store().get(), AppState::default());
    }

    #[tokio::test]
    async fn leave_while_joining_cancels_and_reconciles_late_confirmation() {
        let (mut c, sent) = coordinator(alice(), false);
        c.join("r1".into()).await;

        assert_eq!(c.leave().await, LeaveOutcome::JoinCancelled);
        assert_eq!(c.store().get(), AppState::default());

        c.handle_server_message(joined("u9", "r1")).await;

        assert_eq!(*c.phase(), SessionPhase::Idle);
        assert_eq!(c.store().get(), AppState::default());
        assert_eq!(
            sent.lock().unwrap().last(),
            Some(&ClientMessage::LeaveRoom {
                user_id: "u9".into()
            })
        );
    }

    #[tokio::test]
    async fn duplicate_confirmation_while_active_is_ignored() {
        let (mut c, sent) = active_in_r1().await;

        c.handle_server_message(joined("u1", "r1")).await;

        assert_eq!(sent.lock().unwrap().len(), 1);
        let SessionPhase::Active(session) = c.phase() else {
            panic!("expected Active, got {:?}", c.phase());
        };
        assert_eq!(session.user_id, "u1");
        assert!(c.store().is_current_room("r1"));
    }

    #[tokio::test]
    async fn confirmation_for_other_room_while_joining_is_left() {
        let (mut c, sent) = coordinator(alice(), false);
        c.join("r1".into()).await;

        c.handle_server_message(joined("u7", "r2")).await;

        assert_eq!(
            sent.lock().unwrap().last(),
            Some(&ClientMessage::LeaveRoom {
                user_id: "u7".into()
            })
        );
        assert_eq!(
            *c.phase(),
            SessionPhase::Joining {
                room_id: "r1".into(),
                username: "alice".into()
            }
        );
        assert!(c.store().get().session.is_none());
        assert!(c.store().console_visible());
    }

    // ── Server-driven transitions ───────────────────────────────────

    #[tokio::test]
    async fn room_left_for_active_user_resets() {
        let (mut c, _sent) = active_in_r1().await;
        c.handle_server_message(ServerMessage::RoomLeft {
            user_id: "someone-else".into(),
        })
        .await;
        assert!(matches!(c.phase(), SessionPhase::Active(_)));

        c.handle_server_message(ServerMessage::RoomLeft {
            user_id: "u1".into(),
        })
        .await;
        assert_eq!(*c.phase(), SessionPhase::Idle);
        assert!(!c.store().console_visible());
    }

    #[tokio::test]
    async fn disconnect_drops_session() {
        let (mut c, _sent) = active_in_r1().await;
        c.handle_disconnect();
        assert_eq!(*c.phase(), SessionPhase::Idle);
        assert_eq!(c.store().get(), AppState::default());
    }

    #[tokio::test]
    async fn malformed_incoming_is_ignored() {
        let (mut c, _sent) = active_in_r1().await;
        c.handle_incoming("{not json").await;
        c.handle_incoming(r#"{"type":"chat","data":{"text":"hi"}}"#).await;
        assert!(matches!(c.phase(), SessionPhase::Active(_)));
    }

    #[test]
    fn preview_truncates_long_frames_on_char_boundaries() {
        assert_eq!(preview("{not json"), "{not json");
        let long = "é".repeat(500);
        assert_eq!(preview(&long).chars().count(), MAX_LOGGED_FRAME_CHARS);
        assert!(long.starts_with(preview(&long)));
    }

    #[tokio::test]
    async fn close_leaves_active_room() {
        let (mut c, sent) = active_in_r1().await;
        c.close().await;
        assert!(matches!(
            sent.lock().unwrap().last(),
            Some(ClientMessage::LeaveRoom { .. })
        ));
        assert_eq!(c.store().get(), AppState::default());
    }
}
