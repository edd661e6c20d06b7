//! # Quick Match Example
//!
//! Demonstrates a complete Gridlock client lifecycle:
//!
//! 1. Connect to a game server via WebSocket
//! 2. Authenticate with a username (auto-retried on conflict)
//! 3. Queue for a match and auto-join when paired
//! 4. Play moves (first empty cell) when it's our turn
//! 5. Print the result and the leaderboard, then shut down
//!
//! ## Running
//!
//! ```sh
//! # Start a Gridlock server on localhost:7350, then:
//! cargo run --example quick_match
//!
//! # Override the server URL or username:
//! GRIDLOCK_URL=ws://my-server:7350/ws GRIDLOCK_USER=alice cargo run --example quick_match
//! ```

use gridlock_client::{
    GridlockClient, GridlockConfig, GridlockEvent, Outcome, WebSocketTransport,
};

/// Default server URL when `GRIDLOCK_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:7350/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("GRIDLOCK_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let username = std::env::var("GRIDLOCK_USER").unwrap_or_else(|_| "rustacean".to_string());
    tracing::info!("Connecting to {url} as {username}");

    // ── Connect ─────────────────────────────────────────────────────
    let transport = WebSocketTransport::connect(&url).await?;
    let config = GridlockConfig::new(username);

    // Start the client. This spawns a background task that drives the
    // transport and emits events on `event_rx`.
    let (mut client, mut event_rx) = GridlockClient::start(transport, config);

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the server (or transport layer).
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    GridlockEvent::Connected => {
                        tracing::info!("Transport connected, authenticating…");
                    }

                    GridlockEvent::SessionEstablished { session } => {
                        tracing::info!("Logged in as {} ({})", session.username, session.user_id);
                        client.find_match().await?;
                    }

                    GridlockEvent::UsernameAmended { username } => {
                        tracing::info!("Name was taken, playing as {username}");
                    }

                    GridlockEvent::AuthenticationFailed { error, error_code } => {
                        tracing::error!("Authentication failed ({error_code}): {error}");
                        break;
                    }

                    GridlockEvent::MatchmakingStarted { ticket } => {
                        tracing::info!("In queue (ticket {ticket}), waiting for an opponent…");
                    }

                    GridlockEvent::MatchFound { match_id } => {
                        tracing::info!("Matched into {match_id}, joining…");
                    }

                    GridlockEvent::MatchJoined { self_mark, opponent, .. } => {
                        match opponent {
                            Some(p) => tracing::info!("Playing {} as {self_mark}", p.username),
                            None => tracing::info!("Joined as {self_mark}, waiting for opponent…"),
                        }
                    }

                    GridlockEvent::OpponentJoined { presence } => {
                        tracing::info!("{} joined the match", presence.username);
                    }

                    GridlockEvent::BoardUpdated { board, my_turn } => {
                        println!("\n{board}");
                        if my_turn {
                            // Not a grandmaster: take the first empty cell.
                            if let Some(position) =
                                board.cells().iter().position(Option::is_none)
                            {
                                tracing::info!("Playing cell {position}");
                                client.submit_move(position).await?;
                            }
                        } else {
                            tracing::info!("Opponent's turn…");
                        }
                    }

                    GridlockEvent::MoveRejected { message } => {
                        tracing::warn!("Server rejected the move: {message}");
                    }

                    GridlockEvent::ChatReceived { sender, message } => {
                        println!("[{sender}] {message}");
                    }

                    GridlockEvent::GameOver { outcome, .. } => {
                        match outcome {
                            Outcome::Won => println!("\nYou won!"),
                            Outcome::Lost => println!("\nYou lost"),
                            Outcome::Draw => println!("\nIt's a draw!"),
                        }
                        // Show the standings before leaving.
                        client.fetch_leaderboard(10)?;
                    }

                    GridlockEvent::LeaderboardLoaded { records } => {
                        println!("\n── Leaderboard ──");
                        for (i, record) in records.iter().enumerate() {
                            let rank = record.rank.unwrap_or(i as u64 + 1);
                            let name = record.username.as_deref().unwrap_or("<unknown>");
                            println!("{rank:>3}. {name} — {} wins, {} losses",
                                record.score, record.subscore);
                        }
                        break;
                    }

                    GridlockEvent::OpponentLeft { presence } => {
                        tracing::warn!("{} left the match", presence.username);
                    }

                    GridlockEvent::Disconnected { reason } => {
                        tracing::info!("Disconnected: {}", reason.as_deref().unwrap_or("server closed"));
                        break;
                    }

                    other => {
                        tracing::debug!("Unhandled event: {other:?}");
                    }
                }
            }

            // Branch 2: Ctrl+C — shut down gracefully.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
