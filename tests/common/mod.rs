//! Shared test harness: a channel-backed mock transport with a server-side
//! handle for scripting exchanges.

#![allow(dead_code)]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use gridlock_client::error::GridlockError;
use gridlock_client::protocol::{
    opcodes, ClientMessage, GameOverPayload, GameStatus, Mark, Presence, ServerMessage,
    StateUpdatePayload,
};
use gridlock_client::transport::Transport;

/// Transport backed by in-memory channels; the paired [`MockServer`] plays
/// the other side of the connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, GridlockError>>,
    outgoing: mpsc::UnboundedSender<String>,
}

/// Server-side handle: inject [`ServerMessage`]s and inspect what the client sent.
pub struct MockServer {
    to_client: Option<mpsc::UnboundedSender<Result<String, GridlockError>>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

/// Create a connected mock transport / mock server pair.
pub fn mock_connection() -> (MockTransport, MockServer) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    (
        MockTransport { incoming, outgoing },
        MockServer {
            to_client: Some(to_client),
            from_client,
        },
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), GridlockError> {
        self.outgoing
            .send(message)
            .map_err(|_| GridlockError::TransportSend("mock server gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, GridlockError>> {
        // mpsc::Receiver::recv is cancel-safe.
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), GridlockError> {
        self.incoming.close();
        Ok(())
    }
}

impl MockServer {
    /// Deliver a server message to the client.
    pub fn send(&self, msg: &ServerMessage) {
        let json = serde_json::to_string(msg).expect("serializable server message");
        if let Some(tx) = &self.to_client {
            tx.send(Ok(json)).expect("client transport gone");
        }
    }

    /// Deliver a transport-level receive error to the client.
    pub fn send_error(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            tx.send(Err(GridlockError::TransportReceive(reason.into())))
                .expect("client transport gone");
        }
    }

    /// Deliver raw text (for malformed-frame tests).
    pub fn send_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            tx.send(Ok(text.to_string())).expect("client transport gone");
        }
    }

    /// Simulate the server closing the connection cleanly.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Await the next message sent by the client, with a timeout.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within one second or the payload fails to parse.
    pub async fn next_sent(&mut self) -> ClientMessage {
        let text = tokio::time::timeout(Duration::from_secs(1), self.from_client.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client transport closed");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Collect everything the client has sent so far without waiting.
    pub fn drain_sent(&mut self) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            out.push(serde_json::from_str(&text).expect("client sent invalid JSON"));
        }
        out
    }
}

// ── Well-known identities ───────────────────────────────────────────

pub fn self_id() -> Uuid {
    Uuid::from_u128(0xA11CE)
}

pub fn opponent_id() -> Uuid {
    Uuid::from_u128(0xB0B)
}

pub fn self_presence() -> Presence {
    Presence {
        user_id: self_id(),
        username: "alice".into(),
    }
}

pub fn opponent_presence() -> Presence {
    Presence {
        user_id: opponent_id(),
        username: "bob".into(),
    }
}

// ── Message builders ────────────────────────────────────────────────

pub fn authenticated() -> ServerMessage {
    ServerMessage::Authenticated {
        user_id: self_id(),
        username: "alice".into(),
        token: "session-token".into(),
    }
}

pub fn matchmaker_ticket(ticket: &str) -> ServerMessage {
    ServerMessage::MatchmakerTicket {
        ticket: ticket.into(),
    }
}

pub fn matchmaker_matched(match_id: &str) -> ServerMessage {
    ServerMessage::MatchmakerMatched {
        match_id: match_id.into(),
        token: "join-token".into(),
    }
}

/// A join acknowledgement with both players already present.
pub fn match_joined(match_id: &str) -> ServerMessage {
    ServerMessage::MatchJoined {
        match_id: match_id.into(),
        self_presence: self_presence(),
        presences: vec![self_presence(), opponent_presence()],
    }
}

/// A join acknowledgement while still waiting for the opponent.
pub fn match_joined_alone(match_id: &str) -> ServerMessage {
    ServerMessage::MatchJoined {
        match_id: match_id.into(),
        self_presence: self_presence(),
        presences: vec![self_presence()],
    }
}

pub fn match_data(match_id: &str, op_code: i64, payload: &impl serde::Serialize) -> ServerMessage {
    ServerMessage::MatchData {
        match_id: match_id.into(),
        op_code,
        data: serde_json::to_vec(payload).expect("serializable payload"),
    }
}

/// An authoritative snapshot with the given cells and turn owner.
pub fn state_update(
    match_id: &str,
    board: Vec<Option<Mark>>,
    current_player: Option<Uuid>,
    game_status: GameStatus,
) -> ServerMessage {
    match_data(
        match_id,
        opcodes::STATE_UPDATE,
        &StateUpdatePayload {
            board,
            current_player,
            game_status,
        },
    )
}

pub fn game_over(match_id: &str, winner: Option<Uuid>, reason: Option<&str>) -> ServerMessage {
    match_data(
        match_id,
        opcodes::GAME_OVER,
        &GameOverPayload {
            winner,
            reason: reason.map(str::to_string),
        },
    )
}

/// Shorthand for a board with marks at the given positions.
pub fn board_with(xs: &[usize], os: &[usize]) -> Vec<Option<Mark>> {
    let mut board = vec![None; 9];
    for &i in xs {
        board[i] = Some(Mark::X);
    }
    for &i in os {
        board[i] = Some(Mark::O);
    }
    board
}
