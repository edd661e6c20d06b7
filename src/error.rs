//! Error types for the Gridlock client.

use thiserror::Error;

/// Errors that can occur when using the Gridlock client.
///
/// These are local failures: transport problems and requests rejected before
/// they are sent. Errors the *server* reports arrive asynchronously as
/// [`GridlockEvent`](crate::event::GridlockEvent) values instead.
#[derive(Debug, Error)]
pub enum GridlockError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a match operation but the client is not in a match.
    #[error("not in a match")]
    NotInMatch,

    /// Attempted to submit a move when it is the opponent's turn.
    #[error("not your turn")]
    NotYourTurn,

    /// Attempted to submit a move into a cell that is already marked.
    #[error("cell {0} is already occupied")]
    CellOccupied(usize),

    /// Attempted to submit a move while the match is not active.
    #[error("match is not active")]
    MatchNotActive,

    /// A board position outside `0..9` was supplied.
    #[error("invalid board position {0} (expected 0..9)")]
    InvalidPosition(usize),

    /// A match-data frame carried an opcode this client does not understand.
    #[error("unknown match-data opcode {0}")]
    UnknownOpCode(i64),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Gridlock client operations.
pub type Result<T> = std::result::Result<T, GridlockError>;
