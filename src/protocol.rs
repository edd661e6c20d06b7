//! Wire-compatible protocol types for the Gridlock game server.
//!
//! Two layers share this module:
//!
//! - **Envelope messages** ([`ClientMessage`] / [`ServerMessage`]) — JSON text
//!   frames exchanged on the multiplexed socket (authentication, matchmaking,
//!   match lifecycle, leaderboard, heartbeat).
//! - **Match-data payloads** ([`MatchMessage`]) — opcoded JSON objects carried
//!   as opaque bytes inside `MatchData` envelopes and relayed verbatim by the
//!   server's authoritative match handler.
//!
//! Every type produces identical JSON to the server's protocol modules. The
//! match-data payloads use camelCase keys; the envelope uses snake_case.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GridlockError;
use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for user accounts.
pub type UserId = Uuid;

/// Unique identifier for devices (one fresh ID per authentication attempt).
pub type DeviceId = Uuid;

// ── Enums ───────────────────────────────────────────────────────────

/// A player's mark on the board.
///
/// The first presence in join order plays `X`; the second plays `O`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::O => write!(f, "O"),
        }
    }
}

/// Authoritative match status as reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Waiting for the second player to join.
    #[default]
    Waiting,
    /// Both players present; moves are accepted.
    Active,
    /// The match has concluded.
    Ended,
}

// ── Structs ─────────────────────────────────────────────────────────

/// An authenticated session, immutable for its lifetime.
///
/// Created from the server's `Authenticated` reply and discarded on
/// shutdown or disconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    /// The username the server actually registered. May carry a
    /// disambiguating suffix if the requested name was taken.
    pub username: String,
    /// Opaque server-issued session token.
    pub token: String,
}

/// A participant's identity record within a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Presence {
    pub user_id: UserId,
    pub username: String,
}

/// A single read-only leaderboard entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    /// Owner's display name. Absent for deleted accounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Win count.
    #[serde(default)]
    pub score: u64,
    /// Loss count.
    #[serde(default)]
    pub subscore: u64,
    /// 1-based rank within the listing, if the server computed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
}

// ── Envelope messages ───────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Authenticate a device identity (MUST be the first message).
    ///
    /// A fresh `device_id` is generated per attempt so that usernames can be
    /// reused across sessions.
    Authenticate {
        device_id: DeviceId,
        /// Create the account if it does not exist.
        create: bool,
        username: String,
    },
    /// Submit a matchmaking ticket.
    AddMatchmaker {
        /// Matchmaker query; `"*"` matches anyone.
        query: String,
        min_count: u32,
        max_count: u32,
        /// Optional string properties for matchmaker filtering.
        #[serde(skip_serializing_if = "Option::is_none")]
        string_properties: Option<serde_json::Value>,
    },
    /// Cancel a pending matchmaking ticket.
    RemoveMatchmaker { ticket: String },
    /// Join a match, optionally presenting the matchmaker token.
    JoinMatch {
        match_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Leave the current match.
    LeaveMatch { match_id: String },
    /// Relay an opcoded payload to the authoritative match handler.
    MatchData {
        match_id: String,
        op_code: i64,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    /// Request a page of leaderboard records.
    ListLeaderboardRecords { leaderboard_id: String, limit: u32 },
    /// Heartbeat to maintain the connection.
    Ping,
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Authentication successful; a session is now established.
    Authenticated {
        user_id: UserId,
        /// The username actually registered by the server.
        username: String,
        /// Opaque session token.
        token: String,
    },
    /// Authentication failed.
    ///
    /// `USERNAME_CONFLICT` is the one retryable case; the client retries once
    /// with a disambiguated username.
    AuthenticationError {
        error: String,
        error_code: ErrorCode,
    },
    /// A matchmaking ticket was accepted and is pending.
    MatchmakerTicket { ticket: String },
    /// The matchmaker paired this client with an opponent.
    MatchmakerMatched { match_id: String, token: String },
    /// Successfully joined a match.
    MatchJoined {
        match_id: String,
        /// This client's own presence within the match.
        #[serde(rename = "self")]
        self_presence: Presence,
        /// Other participants already in the match (may be empty while
        /// waiting for the opponent).
        #[serde(default)]
        presences: Vec<Presence>,
    },
    /// The server rejected the join request.
    MatchJoinFailed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
    /// Successfully left the match.
    MatchLeft,
    /// Participants joined or left the match.
    MatchPresence {
        match_id: String,
        #[serde(default)]
        joins: Vec<Presence>,
        #[serde(default)]
        leaves: Vec<Presence>,
    },
    /// An opcoded payload from the authoritative match handler.
    MatchData {
        match_id: String,
        op_code: i64,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    /// A page of leaderboard records.
    LeaderboardRecords { records: Vec<LeaderboardRecord> },
    /// Pong response to ping.
    Pong,
    /// Error message outside the match-data channel.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}

// ── Match-data opcodes ──────────────────────────────────────────────

/// Integer tags identifying a match-data message's semantic type.
pub mod opcodes {
    /// Client → server: place a mark at a board position.
    pub const MOVE: i64 = 1;
    /// Server → client: full board snapshot.
    pub const STATE_UPDATE: i64 = 2;
    /// Server → client: terminal result.
    pub const GAME_OVER: i64 = 3;
    /// Server → client: a player joined the match handler.
    pub const PLAYER_JOINED: i64 = 4;
    /// Server → client: the match handler rejected a request.
    pub const ERROR: i64 = 5;
    /// Either direction: in-match chat line.
    pub const CHAT: i64 = 6;
}

// ── Match-data payloads ─────────────────────────────────────────────

/// Payload for the `MOVE` opcode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovePayload {
    /// Board position, row-major `0..9`.
    pub position: usize,
}

/// Payload for the `STATE_UPDATE` opcode: a full board snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdatePayload {
    /// Nine cells in row-major order; `null` marks an empty cell.
    pub board: Vec<Option<Mark>>,
    /// User whose turn it is. Absent while waiting for the opponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player: Option<UserId>,
    pub game_status: GameStatus,
}

/// Payload for the `GAME_OVER` opcode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameOverPayload {
    /// Winning user, or `None` on a draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<UserId>,
    /// Server-provided reason string; `"draw"` is significant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload for the `PLAYER_JOINED` opcode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedPayload {
    /// Display name of the player who joined.
    pub player: String,
    /// New match status, if the join transitioned the match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_status: Option<GameStatus>,
}

/// Payload for the `ERROR` opcode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub error: String,
}

/// Payload for the `CHAT` opcode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatPayload {
    pub sender: String,
    pub message: String,
}

// ── MatchMessage ────────────────────────────────────────────────────

/// A decoded match-data message: one opcode plus its JSON payload.
///
/// The server treats match-data bytes as opaque; this enum is the client-side
/// typed view. [`encode`](MatchMessage::encode) and
/// [`decode`](MatchMessage::decode) convert to and from the UTF-8 JSON bytes
/// carried in `MatchData` envelopes.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchMessage {
    Move(MovePayload),
    StateUpdate(StateUpdatePayload),
    GameOver(GameOverPayload),
    PlayerJoined(PlayerJoinedPayload),
    Error(ErrorPayload),
    Chat(ChatPayload),
}

impl MatchMessage {
    /// Returns the opcode tagging this message on the wire.
    pub fn op_code(&self) -> i64 {
        match self {
            Self::Move(_) => opcodes::MOVE,
            Self::StateUpdate(_) => opcodes::STATE_UPDATE,
            Self::GameOver(_) => opcodes::GAME_OVER,
            Self::PlayerJoined(_) => opcodes::PLAYER_JOINED,
            Self::Error(_) => opcodes::ERROR,
            Self::Chat(_) => opcodes::CHAT,
        }
    }

    /// Serialize the payload to the UTF-8 JSON bytes carried on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::Serialization`] if the payload cannot be
    /// serialized.
    pub fn encode(&self) -> Result<Vec<u8>, GridlockError> {
        let bytes = match self {
            Self::Move(p) => serde_json::to_vec(p)?,
            Self::StateUpdate(p) => serde_json::to_vec(p)?,
            Self::GameOver(p) => serde_json::to_vec(p)?,
            Self::PlayerJoined(p) => serde_json::to_vec(p)?,
            Self::Error(p) => serde_json::to_vec(p)?,
            Self::Chat(p) => serde_json::to_vec(p)?,
        };
        Ok(bytes)
    }

    /// Decode the payload bytes of a match-data frame according to its opcode.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::UnknownOpCode`] for opcodes this client does
    /// not understand, or [`GridlockError::Serialization`] if the payload does
    /// not match the expected shape.
    pub fn decode(op_code: i64, data: &[u8]) -> Result<Self, GridlockError> {
        let msg = match op_code {
            opcodes::MOVE => Self::Move(serde_json::from_slice(data)?),
            opcodes::STATE_UPDATE => Self::StateUpdate(serde_json::from_slice(data)?),
            opcodes::GAME_OVER => Self::GameOver(serde_json::from_slice(data)?),
            opcodes::PLAYER_JOINED => Self::PlayerJoined(serde_json::from_slice(data)?),
            opcodes::ERROR => Self::Error(serde_json::from_slice(data)?),
            opcodes::CHAT => Self::Chat(serde_json::from_slice(data)?),
            other => return Err(GridlockError::UnknownOpCode(other)),
        };
        Ok(msg)
    }
}
