//! Application state store.
//!
//! [`AppStore`] is the single source of truth for room membership and
//! console visibility. Any component may read a snapshot or subscribe to
//! changes; only the session coordinator writes, through crate-private
//! [`Action`]s applied by the pure [`reduce`] function.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::protocol::{RoomId, UserId};

/// Local record of an active, server-confirmed room membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub username: String,
    pub joined_at_epoch_ms: i64,
}

/// Everything the UI renders from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppState {
    /// Name the user is (or is about to be) in a room under.
    pub username: Option<String>,
    /// Confirmed membership, if any.
    pub session: Option<Session>,
    /// Whether the room console is shown.
    pub console_visible: bool,
}

impl AppState {
    /// Membership id, only present while a session exists.
    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// Room of the active session.
    pub fn room_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.room_id.as_str())
    }

    /// Returns `true` when `room_id` is the room the user is in.
    pub fn is_current_room(&self, room_id: &str) -> bool {
        self.room_id() == Some(room_id)
    }
}

/// State transitions. Only the coordinator dispatches these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    SetUsername(String),
    ShowConsole,
    SetSession(Session),
    SetDefaultState,
}

/// Apply `action` to `state`. Returns `true` if anything changed.
pub(crate) fn reduce(state: &mut AppState, action: Action) -> bool {
    let before = state.clone();
    match action {
        Action::SetUsername(username) => state.username = Some(username),
        Action::ShowConsole => state.console_visible = true,
        Action::SetSession(session) => {
            state.username = Some(session.username.clone());
            state.session = Some(session);
        }
        Action::SetDefaultState => *state = AppState::default(),
    }
    *state != before
}

/// Cloneable handle to the shared application state.
#[derive(Debug, Clone)]
pub struct AppStore {
    tx: Arc<watch::Sender<AppState>>,
}

impl AppStore {
    /// A store initialized to defaults: no session, console hidden.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AppState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current state.
    pub fn get(&self) -> AppState {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.tx.borrow().user_id().map(str::to_owned)
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.tx.borrow().room_id().map(str::to_owned)
    }

    pub fn username(&self) -> Option<String> {
        self.tx.borrow().username.clone()
    }

    pub fn console_visible(&self) -> bool {
        self.tx.borrow().console_visible
    }

    /// Whether the listing row for `room_id` should read "You are here".
    pub fn is_current_room(&self, room_id: &str) -> bool {
        self.tx.borrow().is_current_room(room_id)
    }

    /// Apply `action`, notifying subscribers only if the state changed.
    pub(crate) fn dispatch(&self, action: Action) {
        self.tx.send_if_modified(|state| reduce(state, action));
    }
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}
