//! # Gridlock Client
//!
//! An async, transport-agnostic client for the Gridlock tic-tac-toe game
//! server. The server is authoritative: this crate authenticates, queues for
//! matches, relays moves, and mirrors the server's board snapshots — it never
//! decides game outcomes locally.
//!
//! ## Architecture
//!
//! - **[`GridlockClient`]** — thin handle; methods queue messages to a
//!   background transport loop and return immediately.
//! - **[`GridlockEvent`]** — typed events on a bounded channel; the only way
//!   results reach the consumer.
//! - **[`MatchReducer`]** — deterministic fold of server messages into match
//!   state. No callbacks, no globals; pure state in, events out.
//! - **[`Transport`]** — pluggable message channel. A WebSocket implementation
//!   ships behind the `transport-websocket` feature (enabled by default).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gridlock_client::{GridlockClient, GridlockConfig, GridlockEvent, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = WebSocketTransport::connect("ws://localhost:7350/ws").await?;
//!     let (client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             GridlockEvent::SessionEstablished { session } => {
//!                 println!("logged in as {}", session.username);
//!                 client.find_match().await?;
//!             }
//!             GridlockEvent::BoardUpdated { board, my_turn } => {
//!                 println!("{board}");
//!                 if my_turn {
//!                     client.submit_move(4).await?;
//!                 }
//!             }
//!             GridlockEvent::GameOver { outcome, .. } => {
//!                 println!("result: {outcome:?}");
//!                 break;
//!             }
//!             GridlockEvent::Disconnected { .. } => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! | Feature               | Default | Description                              |
//! |-----------------------|---------|------------------------------------------|
//! | `transport-websocket` | yes     | WebSocket transport via tokio-tungstenite |
//! | `tokio-runtime`       | yes¹    | Tokio rt/time features for the client loop |
//!
//! ¹ implied by `transport-websocket`.

#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod transports;

#[cfg(feature = "tokio-runtime")]
pub use client::{GridlockClient, GridlockConfig};
pub use error::{GridlockError, Result};
pub use error_codes::ErrorCode;
pub use event::GridlockEvent;
pub use protocol::{
    ClientMessage, GameStatus, LeaderboardRecord, Mark, MatchMessage, Presence, ServerMessage,
    Session,
};
pub use state::{BoardState, MatchPhase, MatchReducer, Outcome};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::websocket::WebSocketTransport;
