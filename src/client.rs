//! Async handle for the lobby session.
//!
//! [`LobbyClient`] is a thin handle that queues commands to a background
//! session task over an unbounded MPSC channel. The task owns the
//! [`Coordinator`], so every store mutation happens on that one task, in the
//! order commands and server messages arrive. The UI reads the
//! [`AppStore`] it was started with.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect_lobby("ws://localhost:8080").await?;
//! let identity = IdentityResolver::new(AccessTokenCredentials::new(token, cached_at));
//! let store = AppStore::new();
//! let client = LobbyClient::start(transport, identity, store.clone(), LobbyConfig::default());
//!
//! client.join_room("general")?;
//! let mut changes = store.subscribe();
//! changes.wait_for(|state| state.session.is_some()).await?;
//! client.leave_room()?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::coordinator::Coordinator;
use crate::error::{LobbyError, Result};
use crate::identity::IdentityResolver;
use crate::protocol::RoomId;
use crate::store::AppStore;
use crate::transport::Transport;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`LobbyClient`].
///
/// ```
/// use lobby_client::client::LobbyConfig;
/// use std::time::Duration;
///
/// let config = LobbyConfig::default()
///     .with_token_ttl(Duration::from_secs(30))
///     .with_guest_prefix("visitor");
/// assert_eq!(config.token_ttl, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Overrides how long a cached credential counts as fresh.
    ///
    /// `None` keeps the resolver's own setting (5 seconds unless changed).
    /// Sub-second precision is truncated.
    pub token_ttl: Option<Duration>,
    /// Overrides the prefix for generated guest names. `None` keeps the
    /// resolver's own setting (`"guest"` unless changed).
    pub guest_prefix: Option<String>,
    /// Time the session task gets to leave, close the transport and exit
    /// after [`LobbyClient::shutdown`] before it is aborted.
    ///
    /// Defaults to **1 second**. Zero aborts immediately.
    pub shutdown_timeout: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            token_ttl: None,
            guest_prefix: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl LobbyConfig {
    /// Set how long a cached credential counts as fresh.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    /// Set the prefix for generated guest names.
    #[must_use]
    pub fn with_guest_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.guest_prefix = Some(prefix.into());
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Commands ────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Join { room_id: RoomId },
    Leave,
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running lobby session.
///
/// Methods queue a command and return immediately; results show up in the
/// [`AppStore`]. Failures are logged by the session task, never returned.
pub struct LobbyClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    store: AppStore,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl LobbyClient {
    /// Spawn the session task over `transport` and return its handle.
    ///
    /// A TTL or guest prefix set in `config` overrides the one on `identity`;
    /// unset fields leave the resolver as built.
    /// `store` starts being written to immediately; keep a clone to read it.
    pub fn start(
        transport: impl Transport,
        identity: IdentityResolver,
        store: AppStore,
        config: LobbyConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let connected = Arc::new(AtomicBool::new(true));

        let mut identity = identity;
        if let Some(ttl) = config.token_ttl {
            identity = identity.with_ttl_secs(ttl.as_secs());
        }
        if let Some(prefix) = config.guest_prefix {
            identity = identity.with_guest_prefix(prefix);
        }
        let coordinator = Coordinator::new(transport, identity, store.clone());

        let task = tokio::spawn(session_loop(
            coordinator,
            cmd_rx,
            Arc::clone(&connected),
            shutdown_rx,
        ));

        Self {
            cmd_tx,
            connected,
            store,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Join `room_id` under the resolved username.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::NotConnected`] if the session task has exited.
    pub fn join_room(&self, room_id: impl Into<RoomId>) -> Result<()> {
        self.send(Command::Join {
            room_id: room_id.into(),
        })
    }

    /// Leave the current room. A no-op when there is no session.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::NotConnected`] if the session task has exited.
    pub fn leave_room(&self) -> Result<()> {
        self.send(Command::Leave)
    }

    /// The store this client writes to.
    pub fn store(&self) -> &AppStore {
        &self.store
    }

    /// Returns `true` while the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Leave the room if active, close the transport and stop the task.
    pub async fn shutdown(&mut self) {
        debug!("LobbyClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session task aborted: {join_err}");
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(LobbyError::NotConnected);
        }
        self.cmd_tx.send(cmd).map_err(|_| LobbyError::NotConnected)
    }
}

impl std::fmt::Debug for LobbyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyClient")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for LobbyClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from `Drop`; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background task that serializes UI commands and server messages through
/// the coordinator.
///
/// Exits when the handle is dropped, shutdown is requested, or the transport
/// closes or fails.
async fn session_loop<T: Transport>(
    mut coordinator: Coordinator<T>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    connected: Arc<AtomicBool>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("session loop started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Join { room_id }) => {
                        let outcome = coordinator.join(room_id).await;
                        debug!(?outcome, "join handled");
                    }
                    Some(Command::Leave) => {
                        let outcome = coordinator.leave().await;
                        debug!(?outcome, "leave handled");
                    }
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        coordinator.close().await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                coordinator.close().await;
                break;
            }

            incoming = coordinator.recv() => {
                match incoming {
                    Some(Ok(text)) => coordinator.handle_incoming(&text).await,
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        coordinator.handle_disconnect();
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        coordinator.handle_disconnect();
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Release);
    debug!("session loop exited");
}
