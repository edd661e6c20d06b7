//! Typed events emitted by the Gridlock client.
//!
//! Events are delivered on the bounded channel returned by
//! [`GridlockClient::start`](crate::client::GridlockClient::start). Most map
//! 1:1 to server messages after passing through the
//! [`MatchReducer`](crate::state::MatchReducer); `Connected`, `UsernameAmended`
//! and `Disconnected` are synthesized by the transport loop.

use crate::error_codes::ErrorCode;
use crate::protocol::{GameStatus, LeaderboardRecord, Mark, Presence, Session, UserId};
use crate::state::{BoardState, Outcome};

/// An event emitted by the client's background transport loop.
#[derive(Debug, Clone)]
pub enum GridlockEvent {
    /// The transport is connected; authentication is in flight.
    Connected,
    /// Authentication succeeded and a session is established.
    SessionEstablished { session: Session },
    /// The requested username was taken; the client retried once with this
    /// disambiguated name.
    UsernameAmended { username: String },
    /// Authentication failed terminally (no further retries).
    AuthenticationFailed { error: String, error_code: ErrorCode },
    /// A matchmaking ticket was accepted and is pending.
    MatchmakingStarted { ticket: String },
    /// The pending matchmaking ticket was cancelled.
    MatchmakingCancelled,
    /// The matchmaker paired this client; a join is dispatched automatically.
    MatchFound { match_id: String },
    /// Joined a match. `opponent` is `None` while waiting for the pairing.
    MatchJoined {
        match_id: String,
        self_mark: Mark,
        opponent: Option<Presence>,
    },
    /// The server rejected the join request.
    MatchJoinFailed {
        reason: String,
        error_code: Option<ErrorCode>,
    },
    /// Left the match; state is reset to idle.
    MatchLeft,
    /// The opponent's presence entered the match.
    OpponentJoined { presence: Presence },
    /// The opponent's presence left the match.
    OpponentLeft { presence: Presence },
    /// The match handler announced a player by name (PLAYER_JOINED opcode).
    PlayerJoined {
        player: String,
        game_status: Option<GameStatus>,
    },
    /// An authoritative board snapshot replaced the local board.
    BoardUpdated { board: BoardState, my_turn: bool },
    /// The match ended. `winner` is `None` on a draw.
    GameOver {
        outcome: Outcome,
        winner: Option<UserId>,
    },
    /// The match handler rejected a request (ERROR opcode); no state changed.
    MoveRejected { message: String },
    /// An in-match chat line arrived.
    ChatReceived { sender: String, message: String },
    /// A page of leaderboard records arrived.
    LeaderboardLoaded { records: Vec<LeaderboardRecord> },
    /// Pong response to a heartbeat ping.
    Pong,
    /// The server reported an error outside the match-data channel.
    ServerError {
        message: String,
        error_code: Option<ErrorCode>,
    },
    /// The transport closed. Always the final event; never dropped.
    Disconnected { reason: Option<String> },
}
