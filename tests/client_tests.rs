#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration-style session tests for the lobby client.
//!
//! Drives a real `LobbyClient` against the channel-backed `MockServer` from
//! `tests/common`, asserting on what reaches the room service and on the
//! resulting `AppStore` state.

mod common;

use std::time::Duration;

use lobby_client::freshness::FixedClock;
use lobby_client::protocol::{ClientMessage, ServerMessage};
use lobby_client::{
    AppState, AppStore, IdentityResolver, LobbyClient, LobbyConfig, LobbyError, StaticCredentials,
};

use tokio_test::{assert_err, assert_ok};

use common::{wait_for_state, LogCapture, MockServer, MockTransport};

const NOW: i64 = 1_700_000_000_000;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn alice() -> IdentityResolver {
    IdentityResolver::new(StaticCredentials::with_username("alice", NOW - 1000))
        .with_clock(FixedClock::new(NOW))
}

fn start(identity: IdentityResolver) -> (LobbyClient, MockServer, AppStore) {
    let (transport, server) = MockTransport::pair();
    let store = AppStore::new();
    let client = LobbyClient::start(transport, identity, store.clone(), LobbyConfig::default());
    (client, server, store)
}

/// Start as alice and get confirmed into `r1` as `u1`.
async fn start_active() -> (LobbyClient, MockServer, AppStore) {
    let (client, mut server, store) = start(alice());
    client.join_room("r1").expect("join_room");
    assert!(matches!(
        server.next_sent().await,
        ClientMessage::JoinRoom { .. }
    ));
    server.confirm_join("u1", "r1");
    wait_for_state(&store, |s| s.session.is_some()).await;
    (client, server, store)
}

// ════════════════════════════════════════════════════════════════════
// Join
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn valid_credential_joins_under_its_username() {
    let (mut client, mut server, store) = start(alice());

    client.join_room("r1").expect("join_room");

    assert_eq!(
        server.next_sent().await,
        ClientMessage::JoinRoom {
            room_id: "r1".into(),
            user_name: "alice".into()
        }
    );
    let state = wait_for_state(&store, |s| s.console_visible).await;
    assert_eq!(state.username.as_deref(), Some("alice"));
    server.assert_nothing_sent().await;

    client.shutdown().await;
}

#[tokio::test]
async fn missing_credential_joins_as_guest() {
    let (mut client, mut server, store) = start(IdentityResolver::anonymous());

    client.join_room("r1").expect("join_room");

    let ClientMessage::JoinRoom { user_name, .. } = server.next_sent().await else {
        panic!("expected join_room");
    };
    assert!(user_name.starts_with("guest-"), "got {user_name}");

    let state = wait_for_state(&store, |s| s.console_visible).await;
    assert_eq!(state.username.as_deref(), Some(user_name.as_str()));

    client.shutdown().await;
}

#[tokio::test]
async fn stale_credential_joins_as_guest() {
    let identity = IdentityResolver::new(StaticCredentials::with_username("alice", NOW - 60_000))
        .with_clock(FixedClock::new(NOW));
    let (mut client, mut server, _store) = start(identity);

    client.join_room("r1").expect("join_room");

    let ClientMessage::JoinRoom { user_name, .. } = server.next_sent().await else {
        panic!("expected join_room");
    };
    assert_ne!(user_name, "alice");

    client.shutdown().await;
}

#[tokio::test]
async fn guest_prefix_comes_from_config() {
    let (transport, mut server) = MockTransport::pair();
    let mut client = LobbyClient::start(
        transport,
        IdentityResolver::anonymous(),
        AppStore::new(),
        LobbyConfig::default().with_guest_prefix("visitor"),
    );

    client.join_room("r1").expect("join_room");
    let ClientMessage::JoinRoom { user_name, .. } = server.next_sent().await else {
        panic!("expected join_room");
    };
    assert!(user_name.starts_with("visitor-"), "got {user_name}");

    client.shutdown().await;
}

#[tokio::test]
async fn resolver_settings_survive_default_config() {
    let identity = IdentityResolver::new(StaticCredentials::with_username("alice", NOW - 10_000))
        .with_clock(FixedClock::new(NOW))
        .with_ttl_secs(30);
    let (mut client, mut server, _store) = start(identity);

    client.join_room("r1").expect("join_room");
    assert_eq!(
        server.next_sent().await,
        ClientMessage::JoinRoom {
            room_id: "r1".into(),
            user_name: "alice".into()
        }
    );
    client.shutdown().await;

    let (transport, mut server) = MockTransport::pair();
    let mut client = LobbyClient::start(
        transport,
        IdentityResolver::anonymous().with_guest_prefix("visitor"),
        AppStore::new(),
        LobbyConfig::default(),
    );
    client.join_room("r1").expect("join_room");
    let ClientMessage::JoinRoom { user_name, .. } = server.next_sent().await else {
        panic!("expected join_room");
    };
    assert!(user_name.starts_with("visitor-"), "got {user_name}");

    client.shutdown().await;
}

#[tokio::test]
async fn config_ttl_overrides_resolver() {
    let identity = IdentityResolver::new(StaticCredentials::with_username("alice", NOW - 10_000))
        .with_clock(FixedClock::new(NOW))
        .with_ttl_secs(30);
    let (transport, mut server) = MockTransport::pair();
    let mut client = LobbyClient::start(
        transport,
        identity,
        AppStore::new(),
        LobbyConfig::default().with_token_ttl(Duration::from_secs(5)),
    );

    client.join_room("r1").expect("join_room");
    let ClientMessage::JoinRoom { user_name, .. } = server.next_sent().await else {
        panic!("expected join_room");
    };
    assert_ne!(user_name, "alice");

    client.shutdown().await;
}

#[tokio::test]
async fn confirmation_establishes_session() {
    let (mut client, _server, store) = start_active().await;

    let session = store.get().session.expect("session");
    assert_eq!(session.user_id, "u1");
    assert_eq!(session.room_id, "r1");
    assert_eq!(session.username, "alice");
    assert_eq!(session.joined_at_epoch_ms, NOW);
    assert!(store.is_current_room("r1"));

    client.shutdown().await;
}

#[tokio::test]
async fn failed_join_leaves_store_untouched_and_logs() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let (mut client, mut server, store) = start(alice());

    server.fail_sends(true);
    client.join_room("r1").expect("join_room");
    server.assert_nothing_sent().await;

    assert_eq!(store.get(), AppState::default());
    assert!(
        logs.contents().contains("couldn't join room"),
        "logs were: {}",
        logs.contents()
    );

    // The slot is back to idle, so a later join goes through.
    server.fail_sends(false);
    client.join_room("r2").expect("join_room");
    assert_eq!(
        server.next_sent().await,
        ClientMessage::JoinRoom {
            room_id: "r2".into(),
            user_name: "alice".into()
        }
    );

    client.shutdown().await;
}

#[tokio::test]
async fn duplicate_join_sends_once() {
    let (mut client, mut server, _store) = start_active().await;

    assert_ok!(client.join_room("r1"));
    server.assert_nothing_sent().await;

    client.shutdown().await;
}

#[tokio::test]
async fn join_elsewhere_while_active_is_rejected() {
    let (mut client, mut server, store) = start_active().await;

    client.join_room("r2").expect("join_room");
    server.assert_nothing_sent().await;
    assert!(store.is_current_room("r1"));

    client.shutdown().await;
}

#[tokio::test]
async fn server_error_rolls_back_optimistic_join() {
    let (mut client, mut server, store) = start(alice());

    client.join_room("r1").expect("join_room");
    server.next_sent().await;
    wait_for_state(&store, |s| s.console_visible).await;

    server.push(&ServerMessage::Error {
        message: "room is full".into(),
    });
    let state = wait_for_state(&store, |s| !s.console_visible).await;
    assert_eq!(state, AppState::default());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Leave
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn leave_sends_user_id_and_resets() {
    let (mut client, mut server, store) = start_active().await;

    client.leave_room().expect("leave_room");

    assert_eq!(
        server.next_sent().await,
        ClientMessage::LeaveRoom {
            user_id: "u1".into()
        }
    );
    let state = wait_for_state(&store, |s| s.session.is_none()).await;
    assert_eq!(state, AppState::default());
    server.assert_nothing_sent().await;

    client.shutdown().await;
}

#[tokio::test]
async fn leave_without_session_sends_nothing() {
    let (mut client, mut server, store) = start(alice());

    client.leave_room().expect("leave_room");
    client.join_room("r1").expect("join_room");

    // Commands run in order, so the first thing on the wire is the join.
    assert!(matches!(
        server.next_sent().await,
        ClientMessage::JoinRoom { .. }
    ));
    assert!(store.get().session.is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn leave_while_joining_cancels_and_late_confirmation_is_left() {
    let (mut client, mut server, store) = start(alice());

    client.join_room("r1").expect("join_room");
    server.next_sent().await;
    client.leave_room().expect("leave_room");
    wait_for_state(&store, |s| !s.console_visible).await;

    server.confirm_join("u9", "r1");
    assert_eq!(
        server.next_sent().await,
        ClientMessage::LeaveRoom {
            user_id: "u9".into()
        }
    );
    assert_eq!(store.get(), AppState::default());

    client.shutdown().await;
}

#[tokio::test]
async fn server_side_room_left_resets() {
    let (mut client, server, store) = start_active().await;

    server.push(&ServerMessage::RoomLeft {
        user_id: "u1".into(),
    });
    let state = wait_for_state(&store, |s| s.session.is_none()).await;
    assert!(!state.console_visible);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn hang_up_drops_session_and_disconnects() {
    let (client, mut server, store) = start_active().await;

    server.hang_up();
    wait_for_state(&store, |s| s.session.is_none()).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        while client.is_connected() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("client never noticed the hang-up");
    let err = assert_err!(client.join_room("r1"));
    assert!(matches!(err, LobbyError::NotConnected));
}

#[tokio::test]
async fn receive_error_drops_session() {
    let (mut client, server, store) = start_active().await;

    server.push_error("connection reset");
    let state = wait_for_state(&store, |s| s.session.is_none()).await;
    assert_eq!(state, AppState::default());

    client.shutdown().await;
}

#[tokio::test]
async fn malformed_server_message_is_skipped() {
    let (mut client, server, store) = start_active().await;

    server.push_raw("{not json");
    server.push_raw(r#"{"type":"chat","data":{"text":"hi"}}"#);
    tokio::time::sleep(common::QUIET).await;

    assert!(client.is_connected());
    assert!(store.is_current_room("r1"));

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_room_and_closes_transport() {
    let (mut client, mut server, store) = start_active().await;

    client.shutdown().await;

    assert_eq!(
        server.next_sent().await,
        ClientMessage::LeaveRoom {
            user_id: "u1".into()
        }
    );
    assert!(server.closed.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(store.get(), AppState::default());
    assert!(!client.is_connected());
    assert!(matches!(client.leave_room(), Err(LobbyError::NotConnected)));
}
