//! Async client for the Gridlock game server.
//!
//! [`GridlockClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<GridlockEvent>`]) returned
//! from [`GridlockClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:7350/ws").await?;
//! let config = GridlockConfig::new("alice");
//! let (client, mut events) = GridlockClient::start(transport, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GridlockEvent::SessionEstablished { .. } => client.find_match().await?,
//!         GridlockEvent::BoardUpdated { my_turn: true, .. } => {
//!             client.submit_move(4).await?;
//!         }
//!         GridlockEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{GridlockError, Result};
use crate::event::GridlockEvent;
use crate::protocol::{ChatPayload, ClientMessage, MatchMessage, MovePayload, ServerMessage, Session};
use crate::state::{BoardState, MatchPhase, MatchReducer};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default matchmaker query; matches anyone.
const DEFAULT_MATCHMAKER_QUERY: &str = "*";

/// Default leaderboard listing wins/losses.
const DEFAULT_LEADERBOARD_ID: &str = "tictactoe_wins";

/// Tic-tac-toe is strictly two players.
const MATCH_PLAYER_COUNT: u32 = 2;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GridlockClient`] connection.
///
/// Must be supplied to [`GridlockClient::start`]. The only required field is
/// `username`; all others have sensible defaults.
///
/// # Example
///
/// ```
/// use gridlock_client::client::GridlockConfig;
///
/// let config = GridlockConfig::new("alice");
/// assert_eq!(config.username, "alice");
/// assert_eq!(config.leaderboard_id, "tictactoe_wins");
/// ```
///
/// # Tuning
///
/// ```
/// use gridlock_client::client::GridlockConfig;
/// use std::time::Duration;
///
/// let config = GridlockConfig::new("alice")
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct GridlockConfig {
    /// Requested display name. If the server reports a username conflict, the
    /// client retries exactly once with a disambiguating suffix.
    pub username: String,
    /// Matchmaker query string. Defaults to `"*"` (match anyone).
    pub matchmaker_query: String,
    /// Leaderboard listed by [`GridlockClient::fetch_leaderboard`].
    /// Defaults to `"tictactoe_wins"`.
    pub leaderboard_id: String,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the transport loop.
    /// The `Disconnected` event is always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`GridlockClient::shutdown`] is called, the background transport
    /// loop is given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl GridlockConfig {
    /// Create a new configuration with the given username and default values.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            matchmaker_query: DEFAULT_MATCHMAKER_QUERY.to_string(),
            leaderboard_id: DEFAULT_LEADERBOARD_ID.to_string(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the matchmaker query string.
    #[must_use]
    pub fn with_matchmaker_query(mut self, query: impl Into<String>) -> Self {
        self.matchmaker_query = query.into();
        self
    }

    /// Set the leaderboard listed by [`GridlockClient::fetch_leaderboard`].
    #[must_use]
    pub fn with_leaderboard_id(mut self, leaderboard_id: impl Into<String>) -> Self {
        self.leaderboard_id = leaderboard_id.into();
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the transport loop.
struct ClientState {
    connected: AtomicBool,
    authenticated: AtomicBool,
    reducer: Mutex<MatchReducer>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            authenticated: AtomicBool::new(false),
            reducer: Mutex::new(MatchReducer::new()),
        }
    }
}

/// Tracks the one-shot username-conflict retry across the handshake.
struct AuthRetry {
    base_username: String,
    retried: bool,
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the Gridlock game server.
///
/// Created via [`GridlockClient::start`], which spawns a background transport
/// loop and returns this handle together with an event receiver.
///
/// All public methods serialize a [`ClientMessage`] and send it to the
/// transport loop over an unbounded channel. They return once the message is
/// queued (no round-trip await); results arrive as [`GridlockEvent`]s.
///
/// The channel is a singleton shared resource: only one match may be active
/// at a time. [`find_match`](Self::find_match) enforces this by leaving any
/// active match before queueing a new matchmaking ticket.
pub struct GridlockClient {
    /// Sender half of the command channel to the transport loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the transport loop.
    state: Arc<ClientState>,
    /// Handle to the background transport loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the transport loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
    /// Matchmaker query used by `find_match`.
    matchmaker_query: String,
    /// Leaderboard used by `fetch_leaderboard`.
    leaderboard_id: String,
}

impl GridlockClient {
    /// Start the client transport loop and return a handle plus event receiver.
    ///
    /// The transport loop immediately sends an
    /// [`Authenticate`](ClientMessage::Authenticate) message with a freshly
    /// generated device ID and the configured username. On a username
    /// conflict the loop retries exactly once with a suffixed username and
    /// emits [`GridlockEvent::UsernameAmended`].
    ///
    /// # Arguments
    ///
    /// * `transport` — A connected [`Transport`] implementation.
    /// * `config` — Client configuration including the username.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The event receiver yields
    /// [`GridlockEvent`]s until the transport closes or the client shuts down.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: GridlockConfig,
    ) -> (Self, mpsc::Receiver<GridlockEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<GridlockEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let loop_state = Arc::clone(&state);

        // Send the Authenticate message through the command channel so the
        // transport loop picks it up as the very first outgoing message. A
        // fresh device identity per attempt lets usernames move between
        // devices across sessions.
        let auth_msg = ClientMessage::Authenticate {
            device_id: Uuid::new_v4(),
            create: true,
            username: config.username.clone(),
        };
        // This cannot fail because we just created the channel.
        let _ = cmd_tx.send(auth_msg);

        let auth = AuthRetry {
            base_username: config.username,
            retried: false,
        };

        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            loop_state,
            shutdown_rx,
            auth,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            matchmaker_query: config.matchmaker_query,
            leaderboard_id: config.leaderboard_id,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Queue for a new match.
    ///
    /// If a match is currently active, a `LeaveMatch` is sent first — joining
    /// the matchmaker while still participating in a match would duplicate
    /// server-side participation.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::NotConnected`] if the transport has closed.
    pub async fn find_match(&self) -> Result<()> {
        let active_match = {
            let reducer = self.state.reducer.lock().await;
            reducer.match_id().map(str::to_string)
        };
        if let Some(match_id) = active_match {
            debug!(%match_id, "leaving active match before matchmaking");
            self.send(ClientMessage::LeaveMatch { match_id })?;
        }
        self.send(ClientMessage::AddMatchmaker {
            query: self.matchmaker_query.clone(),
            min_count: MATCH_PLAYER_COUNT,
            max_count: MATCH_PLAYER_COUNT,
            string_properties: None,
        })
    }

    /// Cancel the pending matchmaking ticket, if any.
    ///
    /// A no-op when no ticket is pending.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::NotConnected`] if the transport has closed.
    pub async fn cancel_matchmaking(&self) -> Result<()> {
        let ticket = {
            let reducer = self.state.reducer.lock().await;
            reducer.ticket().map(str::to_string)
        };
        match ticket {
            Some(ticket) => self.send(ClientMessage::RemoveMatchmaker { ticket }),
            None => Ok(()),
        }
    }

    /// Join a specific match, optionally presenting a matchmaker token.
    ///
    /// Matches found via [`find_match`](Self::find_match) are joined
    /// automatically; this method exists for rejoining a known match ID.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::NotConnected`] if the transport has closed.
    pub fn join_match(&self, match_id: impl Into<String>, token: Option<String>) -> Result<()> {
        self.send(ClientMessage::JoinMatch {
            match_id: match_id.into(),
            token,
        })
    }

    /// Leave the current match.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::NotInMatch`] if no match is joined, or
    /// [`GridlockError::NotConnected`] if the transport has closed.
    pub async fn leave_match(&self) -> Result<()> {
        let match_id = {
            let reducer = self.state.reducer.lock().await;
            reducer
                .match_id()
                .map(str::to_string)
                .ok_or(GridlockError::NotInMatch)?
        };
        self.send(ClientMessage::LeaveMatch { match_id })
    }

    /// Submit a move at the given board position (row-major `0..9`).
    ///
    /// The move is fire-and-forget: the local board is NOT updated until the
    /// server echoes an authoritative snapshot. Local validation is limited to
    /// turn ownership and cell emptiness; the server may still reject.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::InvalidPosition`], [`GridlockError::NotInMatch`],
    /// [`GridlockError::MatchNotActive`], [`GridlockError::NotYourTurn`] or
    /// [`GridlockError::CellOccupied`] if the move cannot be sent, or
    /// [`GridlockError::NotConnected`] if the transport has closed.
    pub async fn submit_move(&self, position: usize) -> Result<()> {
        let match_id = {
            let reducer = self.state.reducer.lock().await;
            reducer.can_play(position)?;
            // can_play guarantees a joined match.
            reducer
                .match_id()
                .map(str::to_string)
                .ok_or(GridlockError::NotInMatch)?
        };
        let msg = MatchMessage::Move(MovePayload { position });
        debug!(%match_id, position, "submitting move");
        self.send(ClientMessage::MatchData {
            match_id,
            op_code: msg.op_code(),
            data: msg.encode()?,
        })
    }

    /// Send an in-match chat line.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::NotInMatch`] if no match is joined,
    /// [`GridlockError::NotConnected`] if no session is established or the
    /// transport has closed.
    pub async fn send_chat(&self, message: impl Into<String>) -> Result<()> {
        let (match_id, sender) = {
            let reducer = self.state.reducer.lock().await;
            let match_id = reducer
                .match_id()
                .map(str::to_string)
                .ok_or(GridlockError::NotInMatch)?;
            let sender = reducer
                .session()
                .map(|s| s.username.clone())
                .ok_or(GridlockError::NotConnected)?;
            (match_id, sender)
        };
        let msg = MatchMessage::Chat(ChatPayload {
            sender,
            message: message.into(),
        });
        self.send(ClientMessage::MatchData {
            match_id,
            op_code: msg.op_code(),
            data: msg.encode()?,
        })
    }

    /// Request up to `limit` leaderboard records.
    ///
    /// Records arrive as a [`GridlockEvent::LeaderboardLoaded`] event.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::NotConnected`] if the transport has closed.
    pub fn fetch_leaderboard(&self, limit: u32) -> Result<()> {
        self.send(ClientMessage::ListLeaderboardRecords {
            leaderboard_id: self.leaderboard_id.clone(),
            limit,
        })
    }

    /// Send a heartbeat ping to the server.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::NotConnected`] if the transport has closed.
    pub fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping)
    }

    /// Shut down the client, closing the transport and stopping the background task.
    ///
    /// After calling this method, the event receiver will yield `None` once the
    /// transport loop exits.
    pub async fn shutdown(&mut self) {
        debug!("GridlockClient: shutdown requested");

        // Signal the transport loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the transport loop with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` if the server has confirmed authentication.
    pub fn is_authenticated(&self) -> bool {
        self.state.authenticated.load(Ordering::Acquire)
    }

    /// The established session, once authentication has succeeded.
    pub async fn session(&self) -> Option<Session> {
        self.state.reducer.lock().await.session().cloned()
    }

    /// Current match lifecycle phase.
    pub async fn phase(&self) -> MatchPhase {
        self.state.reducer.lock().await.phase()
    }

    /// ID of the current match, if any.
    pub async fn current_match_id(&self) -> Option<String> {
        self.state.reducer.lock().await.match_id().map(str::to_string)
    }

    /// Snapshot of the current board.
    pub async fn board(&self) -> BoardState {
        self.state.reducer.lock().await.board().clone()
    }

    /// Whether the latest snapshot gives this client the turn.
    pub async fn is_my_turn(&self) -> bool {
        self.state.reducer.lock().await.is_my_turn()
    }

    /// Human-readable banner describing whose turn it is (or the result).
    pub async fn turn_banner(&self) -> &'static str {
        self.state.reducer.lock().await.turn_banner()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a `ClientMessage` to the transport loop.
    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(GridlockError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| GridlockError::NotConnected)
    }
}

impl std::fmt::Debug for GridlockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridlockClient")
            .field("connected", &self.is_connected())
            .field("authenticated", &self.is_authenticated())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for GridlockClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the transport loop future to be dropped immediately.  The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending
        // it would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background transport loop that multiplexes send/receive via `tokio::select!`.
///
/// Exits when:
/// - The command channel closes (client handle dropped or shutdown called)
/// - The transport returns `None` (server closed connection)
/// - A transport error occurs
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<GridlockEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    mut auth: AuthRetry,
) {
    debug!("transport loop started");

    // Emit the synthetic Connected event before entering the select loop.
    emit_event(&event_tx, GridlockEvent::Connected).await;

    loop {
        tokio::select! {
            // Branch 1: outgoing command from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        if let Err(e) = send_message(&mut transport, &msg).await {
                            match e {
                                GridlockError::Serialization(e) => {
                                    // Serialization errors are programming bugs; don't kill the loop.
                                    error!("failed to serialize ClientMessage: {e}");
                                }
                                e => {
                                    error!("transport send error: {e}");
                                    emit_disconnected(
                                        &event_tx,
                                        &state,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                        } else if let ClientMessage::RemoveMatchmaker { .. } = msg {
                            // The server sends no dedicated reply for a
                            // cancelled ticket; clear it locally.
                            state.reducer.lock().await.cancel_matchmaking();
                            emit_event(&event_tx, GridlockEvent::MatchmakingCancelled).await;
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => {
                                if let Err(e) = handle_server_message(
                                    &mut transport,
                                    &event_tx,
                                    &state,
                                    &mut auth,
                                    server_msg,
                                ).await {
                                    error!("transport send error: {e}");
                                    emit_disconnected(
                                        &event_tx,
                                        &state,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("failed to deserialize server message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Serialize and send one `ClientMessage` on the transport.
async fn send_message(transport: &mut impl Transport, msg: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    transport.send(json).await
}

/// Process one decoded [`ServerMessage`]: run the conflict-retry handshake,
/// fold it through the reducer, emit the resulting events, and auto-join
/// matched matches.
///
/// # Errors
///
/// Returns a transport error if a message sent in reaction (auth retry,
/// auto-join) could not be delivered; the caller tears the loop down.
async fn handle_server_message(
    transport: &mut impl Transport,
    event_tx: &mpsc::Sender<GridlockEvent>,
    state: &ClientState,
    auth: &mut AuthRetry,
    msg: ServerMessage,
) -> Result<()> {
    use crate::error_codes::ErrorCode;

    // Username conflicts get exactly one retry with a disambiguated name and
    // a fresh device identity. A second conflict falls through to the reducer
    // and surfaces as AuthenticationFailed.
    if let ServerMessage::AuthenticationError {
        error_code: ErrorCode::UsernameConflict,
        ..
    } = &msg
    {
        if !auth.retried {
            auth.retried = true;
            let amended = amend_username(&auth.base_username);
            info!(username = %amended, "username conflict, retrying with amended name");
            send_message(
                transport,
                &ClientMessage::Authenticate {
                    device_id: Uuid::new_v4(),
                    create: true,
                    username: amended.clone(),
                },
            )
            .await?;
            emit_event(event_tx, GridlockEvent::UsernameAmended { username: amended }).await;
            return Ok(());
        }
    }

    if let ServerMessage::Authenticated { .. } = &msg {
        state.authenticated.store(true, Ordering::Release);
    }

    let events = state.reducer.lock().await.apply(&msg);
    for event in events {
        emit_event(event_tx, event).await;
    }

    // A matched ticket is joined immediately; the consumer sees MatchFound
    // followed by MatchJoined (or MatchJoinFailed) without acting.
    if let ServerMessage::MatchmakerMatched { match_id, token } = msg {
        debug!(%match_id, "matchmaker matched, joining");
        send_message(
            transport,
            &ClientMessage::JoinMatch {
                match_id,
                token: Some(token),
            },
        )
        .await?;
    }

    Ok(())
}

/// Disambiguate a taken username with a short random suffix, e.g.
/// `alice` → `alice_9f3a`.
fn amend_username(base: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(4).collect();
    format!("{base}_{suffix}")
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the transport loop.
async fn emit_event(event_tx: &mpsc::Sender<GridlockEvent>, event: GridlockEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](GridlockEvent::Disconnected) event and update state.
///
/// Uses `send().await` (blocking) instead of `try_send` because `Disconnected`
/// is always the last event on the channel and must never be silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<GridlockEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    state.authenticated.store(false, Ordering::Release);
    let event = GridlockEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error_codes::ErrorCode;
    use crate::protocol::{GameStatus, Mark, Presence, StateUpdatePayload};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, GridlockError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, GridlockError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), GridlockError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, GridlockError>> {
            // Scripted entries are replies: hold them back until the client
            // has sent its first message, as a real server would, so the
            // recorded send order is deterministic under `tokio::select!`.
            while self.sent.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages have been delivered — hang forever
                // so the transport loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), GridlockError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn self_id() -> Uuid {
        Uuid::from_u128(1)
    }

    fn opponent_id() -> Uuid {
        Uuid::from_u128(2)
    }

    fn authenticated_json() -> String {
        serde_json::to_string(&ServerMessage::Authenticated {
            user_id: self_id(),
            username: "alice".into(),
            token: "tok".into(),
        })
        .unwrap()
    }

    fn auth_conflict_json() -> String {
        serde_json::to_string(&ServerMessage::AuthenticationError {
            error: "username taken".into(),
            error_code: ErrorCode::UsernameConflict,
        })
        .unwrap()
    }

    fn match_joined_json() -> String {
        serde_json::to_string(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: Presence {
                user_id: self_id(),
                username: "alice".into(),
            },
            presences: vec![
                Presence {
                    user_id: self_id(),
                    username: "alice".into(),
                },
                Presence {
                    user_id: opponent_id(),
                    username: "bob".into(),
                },
            ],
        })
        .unwrap()
    }

    fn active_snapshot_json(current: Uuid) -> String {
        let payload = StateUpdatePayload {
            board: vec![None; 9],
            current_player: Some(current),
            game_status: GameStatus::Active,
        };
        serde_json::to_string(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: crate::protocol::opcodes::STATE_UPDATE,
            data: serde_json::to_vec(&payload).unwrap(),
        })
        .unwrap()
    }

    // ── Handshake ───────────────────────────────────────────────────

    #[tokio::test]
    async fn start_sends_authenticate_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        // First event should be Connected.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::Connected));

        // Wait for the SessionEstablished event.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::SessionEstablished { .. }));

        // The first sent message should be Authenticate with a fresh device id.
        {
            let messages = sent.lock().unwrap();
            assert!(!messages.is_empty());
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            if let ClientMessage::Authenticate {
                username, create, ..
            } = first
            {
                assert_eq!(username, "alice");
                assert!(create);
            } else {
                panic!("expected Authenticate message");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn username_conflict_retries_exactly_once() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(auth_conflict_json())),
            Some(Ok(authenticated_json())),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        if let GridlockEvent::UsernameAmended { username } = event {
            assert!(username.starts_with("alice_"));
            assert_eq!(username.len(), "alice_".len() + 4);
        } else {
            panic!("expected UsernameAmended, got {event:?}");
        }
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::SessionEstablished { .. }));
        assert!(client.is_authenticated());

        // Two Authenticate messages total: original plus one retry.
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = sent.lock().unwrap();
            let auths: Vec<ClientMessage> = messages
                .iter()
                .map(|m| serde_json::from_str(m).unwrap())
                .filter(|m| matches!(m, ClientMessage::Authenticate { .. }))
                .collect();
            assert_eq!(auths.len(), 2);
            // The retry carries the suffixed username and a new device id.
            let (first_device, second_device) = match (&auths[0], &auths[1]) {
                (
                    ClientMessage::Authenticate { device_id: a, .. },
                    ClientMessage::Authenticate {
                        device_id: b,
                        username,
                        ..
                    },
                ) => {
                    assert!(username.starts_with("alice_"));
                    (*a, *b)
                }
                _ => panic!("expected two Authenticate messages"),
            };
            assert_ne!(first_device, second_device);
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn second_conflict_fails_without_further_retry() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(auth_conflict_json())),
            Some(Ok(auth_conflict_json())),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // UsernameAmended
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            GridlockEvent::AuthenticationFailed {
                error_code: ErrorCode::UsernameConflict,
                ..
            }
        ));
        assert!(!client.is_authenticated());

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = sent.lock().unwrap();
            let auth_count = messages
                .iter()
                .map(|m| serde_json::from_str::<ClientMessage>(m).unwrap())
                .filter(|m| matches!(m, ClientMessage::Authenticate { .. }))
                .count();
            assert_eq!(auth_count, 2, "never more than one retry");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn non_conflict_auth_error_is_not_retried() {
        let error_json = serde_json::to_string(&ServerMessage::AuthenticationError {
            error: "bad username".into(),
            error_code: ErrorCode::InvalidUsername,
        })
        .unwrap();
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(error_json))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            GridlockEvent::AuthenticationFailed {
                error_code: ErrorCode::InvalidUsername,
                ..
            }
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = sent.lock().unwrap();
            let auth_count = messages
                .iter()
                .map(|m| serde_json::from_str::<ClientMessage>(m).unwrap())
                .filter(|m| matches!(m, ClientMessage::Authenticate { .. }))
                .count();
            assert_eq!(auth_count, 1);
        }

        client.shutdown().await;
    }

    // ── Matchmaking and match lifecycle ─────────────────────────────

    #[tokio::test]
    async fn matched_ticket_is_joined_automatically() {
        let matched_json = serde_json::to_string(&ServerMessage::MatchmakerMatched {
            match_id: "m1".into(),
            token: "jt".into(),
        })
        .unwrap();
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(matched_json)),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::MatchFound { .. }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            if let ClientMessage::JoinMatch { match_id, token } = last {
                assert_eq!(match_id, "m1");
                assert_eq!(token.as_deref(), Some("jt"));
            } else {
                panic!("expected JoinMatch, got {last:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn find_match_leaves_active_match_first() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined

        client.find_match().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let parsed: Vec<ClientMessage> = messages
                .iter()
                .map(|m| serde_json::from_str(m).unwrap())
                .collect();
            let leave_pos = parsed
                .iter()
                .position(|m| matches!(m, ClientMessage::LeaveMatch { .. }))
                .expect("LeaveMatch not sent");
            let queue_pos = parsed
                .iter()
                .position(|m| matches!(m, ClientMessage::AddMatchmaker { .. }))
                .expect("AddMatchmaker not sent");
            assert!(
                leave_pos < queue_pos,
                "leaving must precede matchmaking: {parsed:?}"
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn find_match_without_active_match_only_queues() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        client.find_match().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let parsed: Vec<ClientMessage> = messages
                .iter()
                .map(|m| serde_json::from_str(m).unwrap())
                .collect();
            assert!(!parsed
                .iter()
                .any(|m| matches!(m, ClientMessage::LeaveMatch { .. })));
            if let Some(ClientMessage::AddMatchmaker {
                query,
                min_count,
                max_count,
                ..
            }) = parsed
                .iter()
                .find(|m| matches!(m, ClientMessage::AddMatchmaker { .. }))
            {
                assert_eq!(query, "*");
                assert_eq!(*min_count, 2);
                assert_eq!(*max_count, 2);
            } else {
                panic!("expected AddMatchmaker");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_matchmaking_removes_ticket_and_emits_event() {
        let ticket_json = serde_json::to_string(&ServerMessage::MatchmakerTicket {
            ticket: "t-42".into(),
        })
        .unwrap();
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(ticket_json)),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchmakingStarted

        client.cancel_matchmaking().await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::MatchmakingCancelled));
        assert_eq!(client.phase().await, MatchPhase::Idle);

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(last, ClientMessage::RemoveMatchmaker { ticket } if ticket == "t-42"));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_without_ticket_is_a_noop() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        client.cancel_matchmaking().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert!(!messages
                .iter()
                .map(|m| serde_json::from_str::<ClientMessage>(m).unwrap())
                .any(|m| matches!(m, ClientMessage::RemoveMatchmaker { .. })));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn leave_match_requires_a_match() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        let result = client.leave_match().await;
        assert!(matches!(result, Err(GridlockError::NotInMatch)));

        client.shutdown().await;
    }

    // ── Move gating ─────────────────────────────────────────────────

    #[tokio::test]
    async fn submit_move_sends_move_frame_on_own_turn() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
            Some(Ok(active_snapshot_json(self_id()))),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined
        let event = events.recv().await.unwrap(); // BoardUpdated
        assert!(matches!(event, GridlockEvent::BoardUpdated { my_turn: true, .. }));

        client.submit_move(4).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            if let ClientMessage::MatchData {
                match_id,
                op_code,
                data,
            } = last
            {
                assert_eq!(match_id, "m1");
                assert_eq!(op_code, crate::protocol::opcodes::MOVE);
                let decoded = MatchMessage::decode(op_code, &data).unwrap();
                assert_eq!(decoded, MatchMessage::Move(MovePayload { position: 4 }));
            } else {
                panic!("expected MatchData, got {last:?}");
            }
        }

        // The local board stays untouched until the server echoes a snapshot.
        assert_eq!(client.board().await.mark_at(4), None);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_move_rejected_on_opponent_turn() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
            Some(Ok(active_snapshot_json(opponent_id()))),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined
        let _ = events.recv().await; // BoardUpdated

        let result = client.submit_move(4).await;
        assert!(matches!(result, Err(GridlockError::NotYourTurn)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let messages = sent.lock().unwrap();
            assert!(!messages
                .iter()
                .map(|m| serde_json::from_str::<ClientMessage>(m).unwrap())
                .any(|m| matches!(m, ClientMessage::MatchData { .. })));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_move_rejected_before_any_snapshot() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined

        let result = client.submit_move(0).await;
        assert!(matches!(result, Err(GridlockError::MatchNotActive)));

        client.shutdown().await;
    }

    // ── Chat and leaderboard ────────────────────────────────────────

    #[tokio::test]
    async fn send_chat_uses_session_username() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined

        client.send_chat("gg").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            if let ClientMessage::MatchData { op_code, data, .. } = last {
                let decoded = MatchMessage::decode(op_code, &data).unwrap();
                if let MatchMessage::Chat(chat) = decoded {
                    assert_eq!(chat.sender, "alice");
                    assert_eq!(chat.message, "gg");
                } else {
                    panic!("expected Chat payload");
                }
            } else {
                panic!("expected MatchData, got {last:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn fetch_leaderboard_sends_configured_id() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice").with_leaderboard_id("weekly_wins");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        client.fetch_leaderboard(10).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            if let ClientMessage::ListLeaderboardRecords {
                leaderboard_id,
                limit,
            } = last
            {
                assert_eq!(leaderboard_id, "weekly_wins");
                assert_eq!(limit, 10);
            } else {
                panic!("expected ListLeaderboardRecords, got {last:?}");
            }
        }

        client.shutdown().await;
    }

    // ── Lifecycle and configuration ─────────────────────────────────

    #[tokio::test]
    async fn disconnected_on_transport_close() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            // Explicit None signals clean transport close.
            None,
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let event = events.recv().await.unwrap(); // Disconnected
        assert!(matches!(event, GridlockEvent::Disconnected { .. }));

        assert!(!client.is_connected());
        assert!(!client.is_authenticated());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        client.shutdown().await;

        let result = client.ping();
        assert!(matches!(result, Err(GridlockError::NotConnected)));
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected() {
        let (transport, _sent, closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        client.shutdown().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::Disconnected { .. }));
        if let GridlockEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        }

        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        // Drop the client without calling shutdown.
        drop(client);

        // The transport loop should eventually exit; the event channel
        // will close. We just verify we don't hang or panic.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        // Script more pongs than the event channel can hold.
        let mut incoming: Vec<Option<std::result::Result<String, GridlockError>>> = Vec::new();
        incoming.push(Some(Ok(authenticated_json())));
        let pong_json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        for _ in 0..20 {
            incoming.push(Some(Ok(pong_json.clone())));
        }
        incoming.push(None);

        let (transport, _sent, _closed) = MockTransport::new(incoming);

        let config = GridlockConfig::new("alice").with_event_channel_capacity(1);
        let (mut client, mut events) = GridlockClient::start(transport, config);

        // Let the channel fill up and events get dropped.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        while let Some(_event) = events.recv().await {
            count += 1;
        }
        // With capacity 1, Connected and the final Disconnected always arrive;
        // intermediate events may be dropped when the single slot is full.
        assert!(count >= 2, "expected at least 2 events, got {count}");
        assert!(
            count < 23,
            "expected backpressure to drop some events, but got all {count}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = GridlockConfig::new("alice");
        assert_eq!(config.username, "alice");
        assert_eq!(config.matchmaker_query, "*");
        assert_eq!(config.leaderboard_id, "tictactoe_wins");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn config_builder_methods() {
        let config = GridlockConfig::new("alice")
            .with_matchmaker_query("mode:ranked")
            .with_leaderboard_id("weekly_wins")
            .with_event_channel_capacity(512)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.matchmaker_query, "mode:ranked");
        assert_eq!(config.leaderboard_id, "weekly_wins");
        assert_eq!(config.event_channel_capacity, 512);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = GridlockConfig::new("alice").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn state_accessors_reflect_match() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
            Some(Ok(active_snapshot_json(self_id()))),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined
        let _ = events.recv().await; // BoardUpdated

        assert_eq!(client.current_match_id().await.as_deref(), Some("m1"));
        assert_eq!(client.phase().await, MatchPhase::Active);
        assert!(client.is_my_turn().await);
        assert_eq!(client.turn_banner().await, "Your turn! Make your move");
        let session = client.session().await.unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.user_id, self_id());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn amend_username_has_expected_shape() {
        let amended = amend_username("alice");
        assert!(amended.starts_with("alice_"));
        assert_eq!(amended.len(), "alice_".len() + 4);
        // Suffixes are random; two amendments almost surely differ.
        assert_ne!(amend_username("alice"), amend_username("alice"));
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(authenticated_json()))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished

        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("GridlockClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }

    /// Transport that hangs forever in `close()` so shutdown timeout/abort can be tested.
    struct HangingCloseTransport {
        close_called: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl HangingCloseTransport {
        fn new() -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
            let close_called = Arc::new(AtomicBool::new(false));
            let dropped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    close_called: Arc::clone(&close_called),
                    dropped: Arc::clone(&dropped),
                },
                close_called,
                dropped,
            )
        }
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), GridlockError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, GridlockError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), GridlockError> {
            self.close_called.store(true, Ordering::Release);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_transport_task() {
        let (transport, close_called, dropped) = HangingCloseTransport::new();
        let config = GridlockConfig::new("alice")
            .with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) = GridlockClient::start(transport, config);

        // Drain Connected so the channel remains uncongested.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::Connected));

        client.shutdown().await;

        assert!(
            close_called.load(Ordering::Acquire),
            "transport.close() should have been attempted during graceful shutdown"
        );
        assert!(
            dropped.load(Ordering::Acquire),
            "timed-out shutdown should abort and drop the transport loop task"
        );
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn match_left_clears_state() {
        let match_left_json = serde_json::to_string(&ServerMessage::MatchLeft).unwrap();
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
            Some(Ok(match_left_json)),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined
        let _ = events.recv().await; // MatchLeft

        assert!(client.current_match_id().await.is_none());
        assert_eq!(client.phase().await, MatchPhase::Idle);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_recv_error_emits_disconnected() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            GridlockError::TransportReceive("boom".into()),
        ))]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GridlockEvent::Disconnected { .. }));
        if let GridlockEvent::Disconnected { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn game_over_reports_win_for_self() {
        let game_over_json = {
            let payload = crate::protocol::GameOverPayload {
                winner: Some(self_id()),
                reason: None,
            };
            serde_json::to_string(&ServerMessage::MatchData {
                match_id: "m1".into(),
                op_code: crate::protocol::opcodes::GAME_OVER,
                data: serde_json::to_vec(&payload).unwrap(),
            })
            .unwrap()
        };
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
            Some(Ok(active_snapshot_json(self_id()))),
            Some(Ok(game_over_json)),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let _ = events.recv().await; // MatchJoined
        let _ = events.recv().await; // BoardUpdated
        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            GridlockEvent::GameOver {
                outcome: crate::state::Outcome::Won,
                ..
            }
        ));
        assert_eq!(client.turn_banner().await, "You won!");
        assert_eq!(client.phase().await, MatchPhase::Ended);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn match_join_marks_are_assigned() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(authenticated_json())),
            Some(Ok(match_joined_json())),
        ]);

        let config = GridlockConfig::new("alice");
        let (mut client, mut events) = GridlockClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionEstablished
        let event = events.recv().await.unwrap();
        if let GridlockEvent::MatchJoined {
            match_id,
            self_mark,
            opponent,
        } = event
        {
            assert_eq!(match_id, "m1");
            assert_eq!(self_mark, Mark::X);
            assert_eq!(opponent.unwrap().username, "bob");
        } else {
            panic!("expected MatchJoined, got {event:?}");
        }

        client.shutdown().await;
    }
}
