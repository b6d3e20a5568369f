#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Shared test utilities for lobby client integration tests.
//!
//! Provides a channel-backed [`MockTransport`] whose other end, a
//! [`MockServer`], lets a test play the room service: read what the client
//! sent, push replies, make sends fail, or drop the connection.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use lobby_client::protocol::{ClientMessage, ServerMessage};
use lobby_client::{AppState, AppStore, LobbyError, Transport};
use tokio::sync::mpsc;

/// How long a test waits for something that should happen.
pub const WAIT: Duration = Duration::from_secs(2);

/// How long a test waits to be sure something did not happen.
pub const QUIET: Duration = Duration::from_millis(100);

// ── MockTransport ───────────────────────────────────────────────────

/// Client half of the mock connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, LobbyError>>,
    outgoing: mpsc::UnboundedSender<String>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

/// Server half of the mock connection.
pub struct MockServer {
    to_client: Option<mpsc::UnboundedSender<Result<String, LobbyError>>>,
    from_client: mpsc::UnboundedReceiver<String>,
    fail_sends: Arc<AtomicBool>,
    /// Whether the client called `close()`.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a connected `(transport, server)` pair.
    pub fn pair() -> (Self, MockServer) {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let transport = Self {
            incoming,
            outgoing,
            fail_sends: Arc::clone(&fail_sends),
            closed: Arc::clone(&closed),
        };
        let server = MockServer {
            to_client: Some(to_client),
            from_client,
            fail_sends,
            closed,
        };
        (transport, server)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LobbyError::TransportSend("connection refused".into()));
        }
        self.outgoing
            .send(message)
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl MockServer {
    /// Deliver `msg` to the client.
    pub fn push(&self, msg: &ServerMessage) {
        self.push_raw(&serde_json::to_string(msg).expect("serialize server message"));
    }

    /// Deliver raw text to the client.
    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            tx.send(Ok(text.to_string())).expect("client transport dropped");
        }
    }

    /// Deliver a receive error to the client.
    pub fn push_error(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Err(LobbyError::TransportReceive(reason.into())));
        }
    }

    /// Confirm a join.
    pub fn confirm_join(&self, user_id: &str, room_id: &str) {
        self.push(&ServerMessage::RoomJoined {
            user_id: user_id.into(),
            room_id: room_id.into(),
        });
    }

    /// Make every client send fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Close the server side cleanly; the client sees `recv() == None`.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Next message the client sent, waiting up to [`WAIT`].
    pub async fn next_sent(&mut self) -> ClientMessage {
        let text = tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client transport dropped");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Assert the client sends nothing for [`QUIET`].
    pub async fn assert_nothing_sent(&mut self) {
        if let Ok(Some(text)) = tokio::time::timeout(QUIET, self.from_client.recv()).await {
            panic!("expected no client message, got {text}");
        }
    }
}

// ── Store helpers ───────────────────────────────────────────────────

/// Wait until the store satisfies `predicate`, returning that state.
pub async fn wait_for_state(
    store: &AppStore,
    predicate: impl FnMut(&AppState) -> bool,
) -> AppState {
    let mut rx = store.subscribe();
    let state = tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for store state")
        .expect("store sender dropped")
        .clone();
    state
}

// ── Log capture ─────────────────────────────────────────────────────

/// In-memory log sink for asserting on emitted diagnostics.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<StdMutex<Vec<u8>>>);

impl LogCapture {
    /// Everything logged so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Install as the thread's default subscriber until the guard drops.
    ///
    /// Only valid with a current-thread runtime, where the session task runs
    /// on the test's thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("lobby_client=debug"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
