//! Error codes for structured error handling in the Gridlock protocol.
//!
//! These codes are wire-compatible with the server's `ErrorCode` enum and
//! serialize using `SCREAMING_SNAKE_CASE` to match the server's JSON format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes returned by the Gridlock server.
///
/// Each variant corresponds to a specific error condition. The server sends these
/// as `"SCREAMING_SNAKE_CASE"` strings (e.g., `"USERNAME_CONFLICT"`).
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors
    UsernameConflict,
    InvalidUsername,
    InvalidDeviceId,
    AuthenticationRequired,
    InvalidToken,
    SessionExpired,

    // Matchmaking errors
    MatchmakerTicketNotFound,
    AlreadyMatchmaking,
    MatchmakerUnavailable,

    // Match errors
    MatchNotFound,
    MatchFull,
    AlreadyInMatch,
    NotInMatch,
    InvalidMatchState,

    // Gameplay errors
    NotYourTurn,
    CellOccupied,
    InvalidMove,

    // Leaderboard errors
    LeaderboardNotFound,

    // Rate limiting
    RateLimitExceeded,
    TooManyConnections,

    // Server errors
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// These messages are intended to be shown to end users or used for
    /// debugging without consulting the server logs.
    pub fn description(&self) -> &'static str {
        match self {
            // Authentication errors
            Self::UsernameConflict => {
                "The username is already taken by another account. Pick a different name or let the client append a suffix."
            }
            Self::InvalidUsername => {
                "The username is invalid. Usernames must be non-empty and meet length requirements."
            }
            Self::InvalidDeviceId => {
                "The device identifier is malformed. Device IDs must be valid UUIDs."
            }
            Self::AuthenticationRequired => {
                "This operation requires an authenticated session. Authenticate before sending other messages."
            }
            Self::InvalidToken => {
                "The session token is invalid, malformed, or has expired. Authenticate again to obtain a new token."
            }
            Self::SessionExpired => {
                "The session has expired. Authenticate again to continue playing."
            }

            // Matchmaking errors
            Self::MatchmakerTicketNotFound => {
                "The matchmaking ticket could not be found. It may have already resolved or been cancelled."
            }
            Self::AlreadyMatchmaking => {
                "A matchmaking ticket is already pending. Cancel it before submitting another."
            }
            Self::MatchmakerUnavailable => {
                "The matchmaker is temporarily unavailable. Please try again in a few moments."
            }

            // Match errors
            Self::MatchNotFound => {
                "The requested match could not be found. It may have ended or the ID is incorrect."
            }
            Self::MatchFull => {
                "The match already has two players. Queue for a new match instead."
            }
            Self::AlreadyInMatch => {
                "You are already in a match. Leave the current match before joining another."
            }
            Self::NotInMatch => {
                "You are not currently in a match. Join a match before performing this action."
            }
            Self::InvalidMatchState => {
                "The match is in an invalid state for this operation. Leave and queue again."
            }

            // Gameplay errors
            Self::NotYourTurn => {
                "It is the opponent's turn. Wait for the next board update before moving."
            }
            Self::CellOccupied => {
                "The target cell is already marked. Choose an empty cell."
            }
            Self::InvalidMove => {
                "The move was rejected by the server. The board position may be out of range."
            }

            // Leaderboard errors
            Self::LeaderboardNotFound => {
                "The requested leaderboard does not exist on this server."
            }

            // Rate limiting
            Self::RateLimitExceeded => {
                "Too many requests in a short time. Please slow down and try again later."
            }
            Self::TooManyConnections => {
                "You have too many active connections. Close some connections before opening new ones."
            }

            // Server errors
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support if the issue persists."
            }
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again in a few moments."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
