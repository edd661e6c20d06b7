//! Deterministic match-state reducer.
//!
//! [`MatchReducer`] folds incoming [`ServerMessage`]s into UI-facing state and
//! returns the [`GridlockEvent`]s each message produces. It is a plain struct
//! with no channels or callbacks, so the full
//! `idle -> searching -> joined -> active -> ended` lifecycle can be unit
//! tested without a live socket.
//!
//! The reducer never computes win or draw conditions: local state is always a
//! pure projection of the last authoritative server message, and a local move
//! request leaves the board untouched until the server echoes a snapshot.

use tracing::{debug, warn};

use crate::error::{GridlockError, Result};
use crate::event::GridlockEvent;
use crate::protocol::{
    GameStatus, Mark, MatchMessage, Presence, ServerMessage, Session, StateUpdatePayload, UserId,
};

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

// ── Phases ──────────────────────────────────────────────────────────

/// Client-side match lifecycle phase, driven entirely by server messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPhase {
    /// No match and no pending matchmaking ticket.
    #[default]
    Idle,
    /// A matchmaking ticket is pending.
    Searching,
    /// Joined a match, waiting for the opponent or the first snapshot.
    Joined,
    /// Both players present; moves are accepted.
    Active,
    /// The match has concluded.
    Ended,
}

/// Terminal result of a match from this client's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
    Draw,
}

// ── Board ───────────────────────────────────────────────────────────

/// UI-facing board snapshot: nine cells, turn owner, and match status.
///
/// Mutated only by authoritative `STATE_UPDATE` messages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardState {
    cells: [Option<Mark>; BOARD_CELLS],
    current_player: Option<UserId>,
    status: GameStatus,
}

impl BoardState {
    /// All nine cells in row-major order.
    pub fn cells(&self) -> &[Option<Mark>; BOARD_CELLS] {
        &self.cells
    }

    /// The mark at `position`, or `None` for an empty or out-of-range cell.
    pub fn mark_at(&self, position: usize) -> Option<Mark> {
        self.cells.get(position).copied().flatten()
    }

    /// User whose turn it is, if any.
    pub fn current_player(&self) -> Option<UserId> {
        self.current_player
    }

    /// Authoritative match status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Overwrite this snapshot from a `STATE_UPDATE` payload.
    ///
    /// Snapshots shorter than nine cells leave the remainder empty; extra
    /// cells are ignored.
    fn overwrite(&mut self, payload: &StateUpdatePayload) {
        self.cells = [None; BOARD_CELLS];
        for (slot, mark) in self.cells.iter_mut().zip(payload.board.iter()) {
            *slot = *mark;
        }
        self.current_player = payload.current_player;
        self.status = payload.game_status;
    }
}

impl std::fmt::Display for BoardState {
    /// Renders the classic 3×3 grid, e.g.:
    ///
    /// ```text
    ///  X | O | X
    /// ---+---+---
    ///    |   |
    /// ---+---+---
    ///    |   | O
    /// ```
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = |position: usize| -> char {
            match self.mark_at(position) {
                Some(Mark::X) => 'X',
                Some(Mark::O) => 'O',
                None => ' ',
            }
        };
        for row in 0..3 {
            if row > 0 {
                writeln!(f, "---+---+---")?;
            }
            writeln!(
                f,
                " {} | {} | {} ",
                cell(row * 3),
                cell(row * 3 + 1),
                cell(row * 3 + 2)
            )?;
        }
        Ok(())
    }
}

// ── Reducer ─────────────────────────────────────────────────────────

/// Folds server messages into match state and produces typed events.
#[derive(Debug, Default)]
pub struct MatchReducer {
    session: Option<Session>,
    phase: MatchPhase,
    ticket: Option<String>,
    match_id: Option<String>,
    self_mark: Option<Mark>,
    opponent: Option<Presence>,
    /// Opponent name from a `PLAYER_JOINED` announcement, kept until the
    /// full presence record arrives.
    announced_opponent: Option<String>,
    board: BoardState,
    last_outcome: Option<Outcome>,
}

impl MatchReducer {
    /// Create a reducer with no session and no match.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The established session, once authentication has succeeded.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Pending matchmaking ticket, if any.
    pub fn ticket(&self) -> Option<&str> {
        self.ticket.as_deref()
    }

    /// ID of the current match, if any.
    pub fn match_id(&self) -> Option<&str> {
        self.match_id.as_deref()
    }

    /// This client's mark, assigned by join order on match entry.
    pub fn self_mark(&self) -> Option<Mark> {
        self.self_mark
    }

    /// The opponent's presence, once known.
    pub fn opponent(&self) -> Option<&Presence> {
        self.opponent.as_ref()
    }

    /// The opponent's display name, from their presence record or — before
    /// that arrives — from the match handler's join announcement.
    pub fn opponent_username(&self) -> Option<&str> {
        self.opponent
            .as_ref()
            .map(|p| p.username.as_str())
            .or(self.announced_opponent.as_deref())
    }

    /// The latest board snapshot.
    pub fn board(&self) -> &BoardState {
        &self.board
    }

    /// Outcome of the last completed match, if one has ended.
    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    /// Turn ownership, recomputed from the latest snapshot:
    /// `current_player == self user_id` while the match is active.
    pub fn is_my_turn(&self) -> bool {
        if self.board.status != GameStatus::Active {
            return false;
        }
        match (&self.session, self.board.current_player) {
            (Some(session), Some(current)) => current == session.user_id,
            _ => false,
        }
    }

    /// Check whether a move at `position` may be sent to the server.
    ///
    /// This is the only local validation performed before a `MOVE` frame is
    /// dispatched; the server remains authoritative and may still reject.
    ///
    /// # Errors
    ///
    /// - [`GridlockError::InvalidPosition`] for positions outside `0..9`
    /// - [`GridlockError::NotInMatch`] when no match is joined
    /// - [`GridlockError::MatchNotActive`] before the match starts or after it ends
    /// - [`GridlockError::NotYourTurn`] when the opponent owns the turn
    /// - [`GridlockError::CellOccupied`] when the target cell is marked
    pub fn can_play(&self, position: usize) -> Result<()> {
        if position >= BOARD_CELLS {
            return Err(GridlockError::InvalidPosition(position));
        }
        if self.match_id.is_none() {
            return Err(GridlockError::NotInMatch);
        }
        if self.board.status != GameStatus::Active {
            return Err(GridlockError::MatchNotActive);
        }
        if !self.is_my_turn() {
            return Err(GridlockError::NotYourTurn);
        }
        if self.board.mark_at(position).is_some() {
            return Err(GridlockError::CellOccupied(position));
        }
        Ok(())
    }

    /// Human-readable banner describing whose turn it is (or the result).
    pub fn turn_banner(&self) -> &'static str {
        match self.phase {
            MatchPhase::Ended => match self.last_outcome {
                Some(Outcome::Won) => "You won!",
                Some(Outcome::Lost) => "You lost",
                Some(Outcome::Draw) | None => "It's a draw!",
            },
            MatchPhase::Active if self.is_my_turn() => "Your turn! Make your move",
            MatchPhase::Active => "Opponent's turn...",
            _ => "Waiting for game to start...",
        }
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Clear the pending matchmaking ticket (client-initiated cancel).
    pub fn cancel_matchmaking(&mut self) {
        self.ticket = None;
        if self.phase == MatchPhase::Searching {
            self.phase = MatchPhase::Idle;
        }
    }

    /// Reset all match state back to [`MatchPhase::Idle`].
    ///
    /// The session survives a reset; it is discarded only on disconnect.
    pub fn reset(&mut self) {
        self.phase = MatchPhase::Idle;
        self.ticket = None;
        self.match_id = None;
        self.self_mark = None;
        self.opponent = None;
        self.announced_opponent = None;
        self.board = BoardState::default();
        self.last_outcome = None;
    }

    /// Fold one server message into the state, returning the events it
    /// produces in order.
    pub fn apply(&mut self, msg: &ServerMessage) -> Vec<GridlockEvent> {
        match msg {
            ServerMessage::Authenticated {
                user_id,
                username,
                token,
            } => {
                let session = Session {
                    user_id: *user_id,
                    username: username.clone(),
                    token: token.clone(),
                };
                debug!(user_id = %session.user_id, username = %session.username, "session established");
                self.session = Some(session.clone());
                vec![GridlockEvent::SessionEstablished { session }]
            }
            ServerMessage::AuthenticationError { error, error_code } => {
                vec![GridlockEvent::AuthenticationFailed {
                    error: error.clone(),
                    error_code: error_code.clone(),
                }]
            }
            ServerMessage::MatchmakerTicket { ticket } => {
                self.phase = MatchPhase::Searching;
                self.ticket = Some(ticket.clone());
                vec![GridlockEvent::MatchmakingStarted {
                    ticket: ticket.clone(),
                }]
            }
            ServerMessage::MatchmakerMatched { match_id, .. } => {
                self.ticket = None;
                vec![GridlockEvent::MatchFound {
                    match_id: match_id.clone(),
                }]
            }
            ServerMessage::MatchJoined {
                match_id,
                self_presence,
                presences,
            } => self.on_match_joined(match_id, self_presence, presences),
            ServerMessage::MatchJoinFailed { reason, error_code } => {
                self.phase = MatchPhase::Idle;
                vec![GridlockEvent::MatchJoinFailed {
                    reason: reason.clone(),
                    error_code: error_code.clone(),
                }]
            }
            ServerMessage::MatchLeft => {
                self.reset();
                vec![GridlockEvent::MatchLeft]
            }
            ServerMessage::MatchPresence { joins, leaves, .. } => self.on_presence(joins, leaves),
            ServerMessage::MatchData { op_code, data, .. } => self.on_match_data(*op_code, data),
            ServerMessage::LeaderboardRecords { records } => {
                vec![GridlockEvent::LeaderboardLoaded {
                    records: records.clone(),
                }]
            }
            ServerMessage::Pong => vec![GridlockEvent::Pong],
            ServerMessage::Error {
                message,
                error_code,
            } => vec![GridlockEvent::ServerError {
                message: message.clone(),
                error_code: error_code.clone(),
            }],
        }
    }

    // ── Internal transitions ────────────────────────────────────────

    fn on_match_joined(
        &mut self,
        match_id: &str,
        self_presence: &Presence,
        presences: &[Presence],
    ) -> Vec<GridlockEvent> {
        // Build the full participant list in join order, self included.
        let mut all: Vec<&Presence> = presences.iter().collect();
        if !all.iter().any(|p| p.user_id == self_presence.user_id) {
            all.push(self_presence);
        }

        // Join order decides marks: the first participant plays X. A lone
        // self presence is the first joiner and waits for the opponent.
        let self_mark = match all.first() {
            Some(first) if first.user_id == self_presence.user_id => Mark::X,
            Some(_) => Mark::O,
            None => Mark::X,
        };
        let opponent = all
            .iter()
            .find(|p| p.user_id != self_presence.user_id)
            .map(|p| (*p).clone());

        self.match_id = Some(match_id.to_string());
        self.phase = MatchPhase::Joined;
        self.self_mark = Some(self_mark);
        self.opponent = opponent.clone();
        self.announced_opponent = None;
        self.board = BoardState::default();
        self.last_outcome = None;

        debug!(match_id, mark = %self_mark, opponent = ?opponent.as_ref().map(|p| &p.username), "joined match");

        vec![GridlockEvent::MatchJoined {
            match_id: match_id.to_string(),
            self_mark,
            opponent,
        }]
    }

    fn on_presence(&mut self, joins: &[Presence], leaves: &[Presence]) -> Vec<GridlockEvent> {
        let Some(self_id) = self.session.as_ref().map(|s| s.user_id) else {
            return Vec::new();
        };
        let mut events = Vec::new();
        for join in joins.iter().filter(|p| p.user_id != self_id) {
            // The presence record supersedes any announced name.
            self.opponent = Some(join.clone());
            self.announced_opponent = None;
            events.push(GridlockEvent::OpponentJoined {
                presence: join.clone(),
            });
        }
        for leave in leaves.iter().filter(|p| p.user_id != self_id) {
            self.opponent = None;
            self.announced_opponent = None;
            events.push(GridlockEvent::OpponentLeft {
                presence: leave.clone(),
            });
        }
        events
    }

    fn on_match_data(&mut self, op_code: i64, data: &[u8]) -> Vec<GridlockEvent> {
        let msg = match MatchMessage::decode(op_code, data) {
            Ok(msg) => msg,
            Err(e) => {
                // A frame this client cannot decode is never fatal.
                warn!(op_code, "skipping undecodable match-data frame: {e}");
                return Vec::new();
            }
        };
        match msg {
            // The server does not echo raw MOVE frames back; nothing to do.
            MatchMessage::Move(_) => Vec::new(),
            MatchMessage::StateUpdate(payload) => {
                self.board.overwrite(&payload);
                self.phase = match payload.game_status {
                    GameStatus::Waiting => MatchPhase::Joined,
                    GameStatus::Active => MatchPhase::Active,
                    GameStatus::Ended => MatchPhase::Ended,
                };
                vec![GridlockEvent::BoardUpdated {
                    board: self.board.clone(),
                    my_turn: self.is_my_turn(),
                }]
            }
            MatchMessage::GameOver(payload) => {
                self.phase = MatchPhase::Ended;
                self.board.status = GameStatus::Ended;
                self.board.current_player = None;

                let self_id = self.session.as_ref().map(|s| s.user_id);
                let outcome = match payload.winner {
                    None => Outcome::Draw,
                    Some(_) if payload.reason.as_deref() == Some("draw") => Outcome::Draw,
                    Some(winner) if Some(winner) == self_id => Outcome::Won,
                    Some(_) => Outcome::Lost,
                };
                self.last_outcome = Some(outcome);

                debug!(?outcome, winner = ?payload.winner, "game over");
                vec![GridlockEvent::GameOver {
                    outcome,
                    winner: payload.winner,
                }]
            }
            MatchMessage::PlayerJoined(payload) => {
                // The announcement carries a name only; record it as the
                // opponent's identity until the presence record lands.
                let is_self = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.username == payload.player);
                if !is_self {
                    match self.opponent.as_mut() {
                        Some(presence) => presence.username = payload.player.clone(),
                        None => self.announced_opponent = Some(payload.player.clone()),
                    }
                }
                vec![GridlockEvent::PlayerJoined {
                    player: payload.player,
                    game_status: payload.game_status,
                }]
            }
            MatchMessage::Error(payload) => {
                // Server-side rejection: surface it, change no state.
                vec![GridlockEvent::MoveRejected {
                    message: payload.error,
                }]
            }
            MatchMessage::Chat(payload) => vec![GridlockEvent::ChatReceived {
                sender: payload.sender,
                message: payload.message,
            }],
        }
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
    use crate::protocol::{
        opcodes, ErrorPayload, GameOverPayload, MovePayload, PlayerJoinedPayload,
    };
    use uuid::Uuid;

    fn self_id() -> UserId {
        Uuid::from_u128(1)
    }

    fn opponent_id() -> UserId {
        Uuid::from_u128(2)
    }

    fn presence(id: UserId, name: &str) -> Presence {
        Presence {
            user_id: id,
            username: name.into(),
        }
    }

    /// Reducer with an established session for "alice".
    fn authed_reducer() -> MatchReducer {
        let mut reducer = MatchReducer::new();
        let events = reducer.apply(&ServerMessage::Authenticated {
            user_id: self_id(),
            username: "alice".into(),
            token: "tok".into(),
        });
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::SessionEstablished { .. }]
        ));
        reducer
    }

    /// Reducer joined into a two-player match, self first (mark X).
    fn joined_reducer() -> MatchReducer {
        let mut reducer = authed_reducer();
        reducer.apply(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: presence(self_id(), "alice"),
            presences: vec![
                presence(self_id(), "alice"),
                presence(opponent_id(), "bob"),
            ],
        });
        reducer
    }

    fn state_update(board: Vec<Option<Mark>>, current: Option<UserId>, status: GameStatus) -> ServerMessage {
        let payload = StateUpdatePayload {
            board,
            current_player: current,
            game_status: status,
        };
        ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::STATE_UPDATE,
            data: serde_json::to_vec(&payload).unwrap(),
        }
    }

    fn game_over(winner: Option<UserId>, reason: Option<&str>) -> ServerMessage {
        let payload = GameOverPayload {
            winner,
            reason: reason.map(str::to_string),
        };
        ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::GAME_OVER,
            data: serde_json::to_vec(&payload).unwrap(),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[test]
    fn starts_idle_with_no_session() {
        let reducer = MatchReducer::new();
        assert_eq!(reducer.phase(), MatchPhase::Idle);
        assert!(reducer.session().is_none());
        assert!(reducer.match_id().is_none());
    }

    #[test]
    fn ticket_moves_phase_to_searching() {
        let mut reducer = authed_reducer();
        let events = reducer.apply(&ServerMessage::MatchmakerTicket {
            ticket: "t-42".into(),
        });
        assert_eq!(reducer.phase(), MatchPhase::Searching);
        assert_eq!(reducer.ticket(), Some("t-42"));
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::MatchmakingStarted { ticket }] if ticket == "t-42"
        ));
    }

    #[test]
    fn matched_clears_ticket_and_reports_match() {
        let mut reducer = authed_reducer();
        reducer.apply(&ServerMessage::MatchmakerTicket {
            ticket: "t-42".into(),
        });
        let events = reducer.apply(&ServerMessage::MatchmakerMatched {
            match_id: "m1".into(),
            token: "jt".into(),
        });
        assert!(reducer.ticket().is_none());
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::MatchFound { match_id }] if match_id == "m1"
        ));
    }

    #[test]
    fn cancel_matchmaking_returns_to_idle() {
        let mut reducer = authed_reducer();
        reducer.apply(&ServerMessage::MatchmakerTicket {
            ticket: "t-42".into(),
        });
        reducer.cancel_matchmaking();
        assert_eq!(reducer.phase(), MatchPhase::Idle);
        assert!(reducer.ticket().is_none());
    }

    #[test]
    fn match_left_resets_to_idle() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&ServerMessage::MatchLeft);
        assert_eq!(reducer.phase(), MatchPhase::Idle);
        assert!(reducer.match_id().is_none());
        assert!(reducer.opponent().is_none());
        assert!(matches!(events.as_slice(), [GridlockEvent::MatchLeft]));
    }

    // ── Mark assignment ─────────────────────────────────────────────

    #[test]
    fn first_joiner_plays_x() {
        let mut reducer = authed_reducer();
        // Lone self presence: we joined first and wait for the opponent.
        reducer.apply(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: presence(self_id(), "alice"),
            presences: vec![],
        });
        assert_eq!(reducer.self_mark(), Some(Mark::X));
        assert!(reducer.opponent().is_none());
        assert_eq!(reducer.phase(), MatchPhase::Joined);
    }

    #[test]
    fn second_joiner_plays_o() {
        let mut reducer = authed_reducer();
        reducer.apply(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: presence(self_id(), "alice"),
            presences: vec![
                presence(opponent_id(), "bob"),
                presence(self_id(), "alice"),
            ],
        });
        assert_eq!(reducer.self_mark(), Some(Mark::O));
        assert_eq!(reducer.opponent().unwrap().username, "bob");
    }

    #[test]
    fn self_missing_from_presences_is_appended() {
        let mut reducer = authed_reducer();
        // Server listed only the opponent; self is inferred from `self`.
        reducer.apply(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: presence(self_id(), "alice"),
            presences: vec![presence(opponent_id(), "bob")],
        });
        assert_eq!(reducer.self_mark(), Some(Mark::O));
        assert_eq!(reducer.opponent().unwrap().user_id, opponent_id());
    }

    // ── Snapshots and turn ownership ────────────────────────────────

    #[test]
    fn snapshot_overwrites_board_and_grants_turn() {
        // Scenario: board [X,O,X,·,·,·,·,·,·], currentPlayer = self, active.
        let mut reducer = joined_reducer();
        let events = reducer.apply(&state_update(
            vec![
                Some(Mark::X),
                Some(Mark::O),
                Some(Mark::X),
                None,
                None,
                None,
                None,
                None,
                None,
            ],
            Some(self_id()),
            GameStatus::Active,
        ));

        assert_eq!(reducer.phase(), MatchPhase::Active);
        assert!(reducer.is_my_turn());
        assert_eq!(reducer.board().mark_at(0), Some(Mark::X));
        assert_eq!(reducer.board().mark_at(1), Some(Mark::O));
        assert_eq!(reducer.board().mark_at(2), Some(Mark::X));
        assert_eq!(reducer.board().mark_at(3), None);

        // Filled cells are not playable; empty cells are.
        assert!(matches!(
            reducer.can_play(0),
            Err(GridlockError::CellOccupied(0))
        ));
        assert!(matches!(
            reducer.can_play(1),
            Err(GridlockError::CellOccupied(1))
        ));
        assert!(matches!(
            reducer.can_play(2),
            Err(GridlockError::CellOccupied(2))
        ));
        assert!(reducer.can_play(3).is_ok());

        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::BoardUpdated { my_turn: true, .. }]
        ));
        assert_eq!(reducer.turn_banner(), "Your turn! Make your move");
    }

    #[test]
    fn opponent_turn_blocks_moves() {
        let mut reducer = joined_reducer();
        reducer.apply(&state_update(
            vec![None; 9],
            Some(opponent_id()),
            GameStatus::Active,
        ));
        assert!(!reducer.is_my_turn());
        assert!(matches!(
            reducer.can_play(4),
            Err(GridlockError::NotYourTurn)
        ));
        assert_eq!(reducer.turn_banner(), "Opponent's turn...");
    }

    #[test]
    fn waiting_snapshot_blocks_moves() {
        let mut reducer = joined_reducer();
        reducer.apply(&state_update(vec![None; 9], None, GameStatus::Waiting));
        assert_eq!(reducer.phase(), MatchPhase::Joined);
        assert!(!reducer.is_my_turn());
        assert!(matches!(
            reducer.can_play(0),
            Err(GridlockError::MatchNotActive)
        ));
        assert_eq!(reducer.turn_banner(), "Waiting for game to start...");
    }

    #[test]
    fn can_play_rejects_out_of_range_position() {
        let reducer = joined_reducer();
        assert!(matches!(
            reducer.can_play(9),
            Err(GridlockError::InvalidPosition(9))
        ));
    }

    #[test]
    fn can_play_requires_a_match() {
        let reducer = authed_reducer();
        assert!(matches!(reducer.can_play(0), Err(GridlockError::NotInMatch)));
    }

    #[test]
    fn short_snapshot_leaves_remaining_cells_empty() {
        let mut reducer = joined_reducer();
        reducer.apply(&state_update(
            vec![Some(Mark::X)],
            Some(self_id()),
            GameStatus::Active,
        ));
        assert_eq!(reducer.board().mark_at(0), Some(Mark::X));
        for position in 1..BOARD_CELLS {
            assert_eq!(reducer.board().mark_at(position), None);
        }
    }

    #[test]
    fn rerender_of_same_snapshot_is_identical() {
        let mut reducer = joined_reducer();
        let snapshot = state_update(
            vec![
                Some(Mark::X),
                Some(Mark::O),
                None,
                None,
                Some(Mark::X),
                None,
                None,
                None,
                Some(Mark::O),
            ],
            Some(self_id()),
            GameStatus::Active,
        );
        reducer.apply(&snapshot);
        let first = reducer.board().to_string();
        reducer.apply(&snapshot);
        let second = reducer.board().to_string();
        assert_eq!(first, second);
        assert_eq!(first, " X | O |   \n---+---+---\n   | X |   \n---+---+---\n   |   | O \n");
    }

    // ── Game over classification ────────────────────────────────────

    #[test]
    fn game_over_self_winner_is_a_win() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&game_over(Some(self_id()), None));
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::GameOver { outcome: Outcome::Won, .. }]
        ));
        assert_eq!(reducer.phase(), MatchPhase::Ended);
        assert_eq!(reducer.turn_banner(), "You won!");
    }

    #[test]
    fn game_over_opponent_winner_is_a_loss() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&game_over(Some(opponent_id()), None));
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::GameOver { outcome: Outcome::Lost, .. }]
        ));
        assert_eq!(reducer.turn_banner(), "You lost");
    }

    #[test]
    fn game_over_without_winner_is_a_draw() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&game_over(None, None));
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::GameOver { outcome: Outcome::Draw, .. }]
        ));
    }

    #[test]
    fn game_over_draw_reason_beats_winner_field() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&game_over(Some(opponent_id()), Some("draw")));
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::GameOver { outcome: Outcome::Draw, .. }]
        ));
    }

    #[test]
    fn game_over_ends_turn_ownership() {
        let mut reducer = joined_reducer();
        reducer.apply(&state_update(
            vec![None; 9],
            Some(self_id()),
            GameStatus::Active,
        ));
        assert!(reducer.is_my_turn());
        reducer.apply(&game_over(Some(self_id()), None));
        assert!(!reducer.is_my_turn());
        assert!(matches!(
            reducer.can_play(0),
            Err(GridlockError::MatchNotActive)
        ));
    }

    // ── Presence and opcode plumbing ────────────────────────────────

    #[test]
    fn presence_join_and_leave_track_opponent() {
        let mut reducer = authed_reducer();
        reducer.apply(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: presence(self_id(), "alice"),
            presences: vec![],
        });
        assert!(reducer.opponent().is_none());

        let events = reducer.apply(&ServerMessage::MatchPresence {
            match_id: "m1".into(),
            joins: vec![presence(opponent_id(), "bob")],
            leaves: vec![],
        });
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::OpponentJoined { presence }] if presence.username == "bob"
        ));
        assert_eq!(reducer.opponent().unwrap().username, "bob");

        let events = reducer.apply(&ServerMessage::MatchPresence {
            match_id: "m1".into(),
            joins: vec![],
            leaves: vec![presence(opponent_id(), "bob")],
        });
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::OpponentLeft { .. }]
        ));
        assert!(reducer.opponent().is_none());
    }

    #[test]
    fn own_presence_updates_are_ignored() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&ServerMessage::MatchPresence {
            match_id: "m1".into(),
            joins: vec![presence(self_id(), "alice")],
            leaves: vec![],
        });
        assert!(events.is_empty());
    }

    #[test]
    fn error_opcode_surfaces_rejection_without_state_change() {
        let mut reducer = joined_reducer();
        reducer.apply(&state_update(
            vec![None; 9],
            Some(self_id()),
            GameStatus::Active,
        ));
        let board_before = reducer.board().clone();

        let payload = ErrorPayload {
            error: "cell occupied".into(),
        };
        let events = reducer.apply(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::ERROR,
            data: serde_json::to_vec(&payload).unwrap(),
        });

        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::MoveRejected { message }] if message == "cell occupied"
        ));
        assert_eq!(reducer.board(), &board_before);
        assert_eq!(reducer.phase(), MatchPhase::Active);
    }

    #[test]
    fn unknown_opcode_is_skipped() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: 99,
            data: b"{}".to_vec(),
        });
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let mut reducer = joined_reducer();
        let events = reducer.apply(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::STATE_UPDATE,
            data: b"not json".to_vec(),
        });
        assert!(events.is_empty());
        assert_eq!(reducer.phase(), MatchPhase::Joined);
    }

    #[test]
    fn move_echo_produces_no_events() {
        let mut reducer = joined_reducer();
        let payload = MovePayload { position: 4 };
        let events = reducer.apply(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::MOVE,
            data: serde_json::to_vec(&payload).unwrap(),
        });
        assert!(events.is_empty());
        // A move never mutates the local board; only STATE_UPDATE does.
        assert_eq!(reducer.board().mark_at(4), None);
    }

    #[test]
    fn player_joined_announcement_names_the_opponent() {
        let mut reducer = authed_reducer();
        // Joined first, alone: no presence record for the opponent yet.
        reducer.apply(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: presence(self_id(), "alice"),
            presences: vec![],
        });
        assert!(reducer.opponent_username().is_none());

        let payload = PlayerJoinedPayload {
            player: "bob".into(),
            game_status: Some(GameStatus::Active),
        };
        reducer.apply(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::PLAYER_JOINED,
            data: serde_json::to_vec(&payload).unwrap(),
        });

        // The name is known even though the presence record is not.
        assert_eq!(reducer.opponent_username(), Some("bob"));
        assert!(reducer.opponent().is_none());

        // Once the presence lands it becomes the source of truth.
        reducer.apply(&ServerMessage::MatchPresence {
            match_id: "m1".into(),
            joins: vec![presence(opponent_id(), "bob")],
            leaves: vec![],
        });
        assert_eq!(reducer.opponent().unwrap().user_id, opponent_id());
        assert_eq!(reducer.opponent_username(), Some("bob"));
    }

    #[test]
    fn own_join_announcement_is_not_the_opponent() {
        let mut reducer = authed_reducer();
        reducer.apply(&ServerMessage::MatchJoined {
            match_id: "m1".into(),
            self_presence: presence(self_id(), "alice"),
            presences: vec![],
        });

        let payload = PlayerJoinedPayload {
            player: "alice".into(),
            game_status: None,
        };
        reducer.apply(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::PLAYER_JOINED,
            data: serde_json::to_vec(&payload).unwrap(),
        });
        assert!(reducer.opponent_username().is_none());
    }

    #[test]
    fn server_error_is_surfaced_as_event() {
        let mut reducer = authed_reducer();
        let events = reducer.apply(&ServerMessage::Error {
            message: "maintenance in 5 minutes".into(),
            error_code: Some(ErrorCode::ServiceUnavailable),
        });
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::ServerError {
                message,
                error_code: Some(ErrorCode::ServiceUnavailable),
            }] if message == "maintenance in 5 minutes"
        ));
        // Server-side trouble never tears down local state.
        assert_eq!(reducer.phase(), MatchPhase::Idle);
        assert!(reducer.session().is_some());
    }

    #[test]
    fn player_joined_opcode_is_surfaced() {
        let mut reducer = joined_reducer();
        let payload = PlayerJoinedPayload {
            player: "bob".into(),
            game_status: Some(GameStatus::Active),
        };
        let events = reducer.apply(&ServerMessage::MatchData {
            match_id: "m1".into(),
            op_code: opcodes::PLAYER_JOINED,
            data: serde_json::to_vec(&payload).unwrap(),
        });
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::PlayerJoined { player, game_status: Some(GameStatus::Active) }]
                if player == "bob"
        ));
    }

    #[test]
    fn auth_error_event_carries_code() {
        let mut reducer = MatchReducer::new();
        let events = reducer.apply(&ServerMessage::AuthenticationError {
            error: "taken".into(),
            error_code: ErrorCode::UsernameConflict,
        });
        assert!(matches!(
            events.as_slice(),
            [GridlockEvent::AuthenticationFailed { error_code: ErrorCode::UsernameConflict, .. }]
        ));
    }
}
