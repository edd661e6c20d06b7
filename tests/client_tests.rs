//! End-to-end client flows against a scripted mock server.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use common::*;

use gridlock_client::error_codes::ErrorCode;
use gridlock_client::protocol::{opcodes, ChatPayload, ClientMessage, GameStatus, Mark, MatchMessage, PlayerJoinedPayload, ServerMessage};
use gridlock_client::{GridlockClient, GridlockConfig, GridlockError, GridlockEvent, MatchPhase, Outcome};

use tokio::sync::mpsc;
use std::time::Duration;

async fn next_event(events: &mut mpsc::Receiver<GridlockEvent>) -> GridlockEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Drive the handshake: consume Connected, answer Authenticate, consume
/// SessionEstablished.
async fn establish_session(
    server: &mut MockServer,
    events: &mut mpsc::Receiver<GridlockEvent>,
) {
    assert!(matches!(next_event(events).await, GridlockEvent::Connected));
    let first = server.next_sent().await;
    assert!(matches!(first, ClientMessage::Authenticate { .. }));
    server.send(&authenticated());
    assert!(matches!(
        next_event(events).await,
        GridlockEvent::SessionEstablished { .. }
    ));
}

#[tokio::test]
async fn full_match_flow_ends_in_win() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    // Queue for a match.
    client.find_match().await.unwrap();
    let sent = server.next_sent().await;
    assert!(matches!(sent, ClientMessage::AddMatchmaker { min_count: 2, max_count: 2, .. }));

    server.send(&matchmaker_ticket("t1"));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::MatchmakingStarted { ticket } if ticket == "t1"
    ));
    assert_eq!(client.phase().await, MatchPhase::Searching);

    // Matchmaker pairs us; client joins without being asked.
    server.send(&matchmaker_matched("m1"));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::MatchFound { match_id } if match_id == "m1"
    ));
    let sent = server.next_sent().await;
    assert!(matches!(
        sent,
        ClientMessage::JoinMatch { match_id, token: Some(token) }
            if match_id == "m1" && token == "join-token"
    ));

    server.send(&match_joined("m1"));
    match next_event(&mut events).await {
        GridlockEvent::MatchJoined {
            match_id,
            self_mark,
            opponent,
        } => {
            assert_eq!(match_id, "m1");
            assert_eq!(self_mark, Mark::X);
            assert_eq!(opponent.unwrap().username, "bob");
        }
        other => panic!("expected MatchJoined, got {other:?}"),
    }

    // First snapshot: empty board, our turn.
    server.send(&state_update(
        "m1",
        board_with(&[], &[]),
        Some(self_id()),
        GameStatus::Active,
    ));
    match next_event(&mut events).await {
        GridlockEvent::BoardUpdated { board, my_turn } => {
            assert!(my_turn);
            assert!(board.cells().iter().all(Option::is_none));
        }
        other => panic!("expected BoardUpdated, got {other:?}"),
    }

    // Play the center; no local echo until the server answers.
    client.submit_move(4).await.unwrap();
    let sent = server.next_sent().await;
    match sent {
        ClientMessage::MatchData {
            match_id,
            op_code,
            data,
        } => {
            assert_eq!(match_id, "m1");
            let decoded = MatchMessage::decode(op_code, &data).unwrap();
            assert!(matches!(decoded, MatchMessage::Move(m) if m.position == 4));
        }
        other => panic!("expected MatchData, got {other:?}"),
    }
    assert_eq!(client.board().await.mark_at(4), None);

    // Server echoes the move and hands the turn over.
    server.send(&state_update(
        "m1",
        board_with(&[4], &[]),
        Some(opponent_id()),
        GameStatus::Active,
    ));
    match next_event(&mut events).await {
        GridlockEvent::BoardUpdated { board, my_turn } => {
            assert!(!my_turn);
            assert_eq!(board.mark_at(4), Some(Mark::X));
        }
        other => panic!("expected BoardUpdated, got {other:?}"),
    }

    // Fast-forward to the end: we win.
    server.send(&game_over("m1", Some(self_id()), None));
    match next_event(&mut events).await {
        GridlockEvent::GameOver { outcome, winner } => {
            assert_eq!(outcome, Outcome::Won);
            assert_eq!(winner, Some(self_id()));
        }
        other => panic!("expected GameOver, got {other:?}"),
    }
    assert_eq!(client.phase().await, MatchPhase::Ended);
    assert_eq!(client.turn_banner().await, "You won!");

    client.shutdown().await;
}

#[tokio::test]
async fn username_conflict_is_retried_once_with_suffix() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    assert!(matches!(next_event(&mut events).await, GridlockEvent::Connected));
    let first = server.next_sent().await;
    let ClientMessage::Authenticate { device_id: first_device, username, .. } = first else {
        panic!("expected Authenticate");
    };
    assert_eq!(username, "alice");

    server.send(&ServerMessage::AuthenticationError {
        error: "username taken".into(),
        error_code: ErrorCode::UsernameConflict,
    });

    // Retry carries a suffixed name and a fresh device identity.
    let retry = server.next_sent().await;
    let ClientMessage::Authenticate { device_id: second_device, username, .. } = retry else {
        panic!("expected Authenticate retry");
    };
    assert!(username.starts_with("alice_"));
    assert_ne!(first_device, second_device);
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::UsernameAmended { username } if username.starts_with("alice_")
    ));

    server.send(&authenticated());
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::SessionEstablished { .. }
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn second_conflict_surfaces_authentication_failed() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    assert!(matches!(next_event(&mut events).await, GridlockEvent::Connected));
    let _ = server.next_sent().await;

    let conflict = ServerMessage::AuthenticationError {
        error: "username taken".into(),
        error_code: ErrorCode::UsernameConflict,
    };
    server.send(&conflict);
    let _ = server.next_sent().await; // the one retry
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::UsernameAmended { .. }
    ));

    server.send(&conflict);
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::AuthenticationFailed {
            error_code: ErrorCode::UsernameConflict,
            ..
        }
    ));

    // No third Authenticate goes out.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.drain_sent().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn requeueing_leaves_the_active_match_first() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    server.send(&match_joined("m1"));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::MatchJoined { .. }
    ));

    client.find_match().await.unwrap();

    let first = server.next_sent().await;
    assert!(matches!(first, ClientMessage::LeaveMatch { match_id } if match_id == "m1"));
    let second = server.next_sent().await;
    assert!(matches!(second, ClientMessage::AddMatchmaker { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn cancelling_matchmaking_resets_to_idle() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    client.find_match().await.unwrap();
    let _ = server.next_sent().await;
    server.send(&matchmaker_ticket("t1"));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::MatchmakingStarted { .. }
    ));

    client.cancel_matchmaking().await.unwrap();
    let sent = server.next_sent().await;
    assert!(matches!(sent, ClientMessage::RemoveMatchmaker { ticket } if ticket == "t1"));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::MatchmakingCancelled
    ));
    assert_eq!(client.phase().await, MatchPhase::Idle);

    client.shutdown().await;
}

#[tokio::test]
async fn occupied_and_out_of_range_cells_are_rejected_locally() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;
    server.send(&match_joined("m1"));
    let _ = next_event(&mut events).await;

    // Mid-game snapshot: X O X across the top, our turn.
    server.send(&state_update(
        "m1",
        board_with(&[0, 2], &[1]),
        Some(self_id()),
        GameStatus::Active,
    ));
    match next_event(&mut events).await {
        GridlockEvent::BoardUpdated { my_turn, .. } => assert!(my_turn),
        other => panic!("expected BoardUpdated, got {other:?}"),
    }

    for occupied in [0, 1, 2] {
        assert!(matches!(
            client.submit_move(occupied).await,
            Err(GridlockError::CellOccupied(p)) if p == occupied
        ));
    }
    assert!(matches!(
        client.submit_move(9).await,
        Err(GridlockError::InvalidPosition(9))
    ));

    // An empty cell still goes through.
    client.submit_move(3).await.unwrap();
    assert!(matches!(server.next_sent().await, ClientMessage::MatchData { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn draw_reported_when_winner_absent_or_reason_says_so() {
    // Winner absent.
    {
        let (transport, mut server) = mock_connection();
        let (mut client, mut events) =
            GridlockClient::start(transport, GridlockConfig::new("alice"));
        establish_session(&mut server, &mut events).await;
        server.send(&match_joined("m1"));
        let _ = next_event(&mut events).await;

        server.send(&game_over("m1", None, None));
        assert!(matches!(
            next_event(&mut events).await,
            GridlockEvent::GameOver {
                outcome: Outcome::Draw,
                winner: None
            }
        ));
        assert_eq!(client.turn_banner().await, "It's a draw!");
        client.shutdown().await;
    }

    // Reason string overrides a populated winner field.
    {
        let (transport, mut server) = mock_connection();
        let (mut client, mut events) =
            GridlockClient::start(transport, GridlockConfig::new("alice"));
        establish_session(&mut server, &mut events).await;
        server.send(&match_joined("m1"));
        let _ = next_event(&mut events).await;

        server.send(&game_over("m1", Some(opponent_id()), Some("draw")));
        assert!(matches!(
            next_event(&mut events).await,
            GridlockEvent::GameOver {
                outcome: Outcome::Draw,
                ..
            }
        ));
        client.shutdown().await;
    }
}

#[tokio::test]
async fn opponent_win_reported_as_loss() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;
    server.send(&match_joined("m1"));
    let _ = next_event(&mut events).await;

    server.send(&game_over("m1", Some(opponent_id()), Some("win")));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::GameOver {
            outcome: Outcome::Lost,
            ..
        }
    ));
    assert_eq!(client.turn_banner().await, "You lost");

    client.shutdown().await;
}

#[tokio::test]
async fn chat_round_trip() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;
    server.send(&match_joined("m1"));
    let _ = next_event(&mut events).await;

    client.send_chat("good luck").await.unwrap();
    let sent = server.next_sent().await;
    let ClientMessage::MatchData { op_code, data, .. } = sent else {
        panic!("expected MatchData");
    };
    let decoded = MatchMessage::decode(op_code, &data).unwrap();
    assert_eq!(
        decoded,
        MatchMessage::Chat(ChatPayload {
            sender: "alice".into(),
            message: "good luck".into(),
        })
    );

    server.send(&match_data(
        "m1",
        opcodes::CHAT,
        &ChatPayload {
            sender: "bob".into(),
            message: "you too".into(),
        },
    ));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::ChatReceived { sender, message }
            if sender == "bob" && message == "you too"
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn player_joined_announcement_and_presence_tracking() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    // Join alone first.
    server.send(&match_joined_alone("m1"));
    match next_event(&mut events).await {
        GridlockEvent::MatchJoined { opponent, .. } => assert!(opponent.is_none()),
        other => panic!("expected MatchJoined, got {other:?}"),
    }
    assert_eq!(client.turn_banner().await, "Waiting for game to start...");

    // Opponent presence arrives.
    server.send(&ServerMessage::MatchPresence {
        match_id: "m1".into(),
        joins: vec![opponent_presence()],
        leaves: vec![],
    });
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::OpponentJoined { presence } if presence.username == "bob"
    ));

    // Handler broadcasts the announcement opcode.
    server.send(&match_data(
        "m1",
        opcodes::PLAYER_JOINED,
        &PlayerJoinedPayload {
            player: "bob".into(),
            game_status: Some(GameStatus::Active),
        },
    ));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::PlayerJoined { player, .. } if player == "bob"
    ));

    // Opponent leaves again.
    server.send(&ServerMessage::MatchPresence {
        match_id: "m1".into(),
        joins: vec![],
        leaves: vec![opponent_presence()],
    });
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::OpponentLeft { presence } if presence.username == "bob"
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn leaderboard_request_and_response() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    client.fetch_leaderboard(10).unwrap();
    let sent = server.next_sent().await;
    assert!(matches!(
        sent,
        ClientMessage::ListLeaderboardRecords { leaderboard_id, limit }
            if leaderboard_id == "tictactoe_wins" && limit == 10
    ));

    server.send_raw(
        r#"{"type":"LeaderboardRecords","data":{"records":[
            {"username":"bob","score":12,"subscore":3,"rank":1},
            {"username":"alice","score":7,"subscore":5,"rank":2}
        ]}}"#,
    );
    match next_event(&mut events).await {
        GridlockEvent::LeaderboardLoaded { records } => {
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].username.as_deref(), Some("bob"));
            assert_eq!(records[0].score, 12);
            assert_eq!(records[0].subscore, 3);
            assert_eq!(records[1].rank, Some(2));
        }
        other => panic!("expected LeaderboardLoaded, got {other:?}"),
    }

    client.shutdown().await;
}

#[tokio::test]
async fn malformed_frames_and_unknown_opcodes_are_skipped() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;
    server.send(&match_joined("m1"));
    let _ = next_event(&mut events).await;

    // Garbage text, then a structurally valid frame with an unknown opcode.
    server.send_raw("{not json");
    server.send(&ServerMessage::MatchData {
        match_id: "m1".into(),
        op_code: 99,
        data: b"{}".to_vec(),
    });

    // The loop keeps running; a subsequent real message still arrives.
    server.send(&state_update(
        "m1",
        board_with(&[], &[]),
        Some(self_id()),
        GameStatus::Active,
    ));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::BoardUpdated { my_turn: true, .. }
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn error_opcode_rejects_move_without_state_change() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;
    server.send(&match_joined("m1"));
    let _ = next_event(&mut events).await;
    server.send(&state_update(
        "m1",
        board_with(&[], &[]),
        Some(self_id()),
        GameStatus::Active,
    ));
    let _ = next_event(&mut events).await;
    let board_before = client.board().await;

    server.send(&match_data(
        "m1",
        opcodes::ERROR,
        &gridlock_client::protocol::ErrorPayload {
            error: "Invalid move".into(),
        },
    ));
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::MoveRejected { message } if message == "Invalid move"
    ));
    assert_eq!(client.board().await, board_before);
    assert_eq!(client.phase().await, MatchPhase::Active);

    client.shutdown().await;
}

#[tokio::test]
async fn server_close_delivers_final_disconnected() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    server.close();
    assert!(matches!(
        next_event(&mut events).await,
        GridlockEvent::Disconnected { reason: None }
    ));
    assert!(!client.is_connected());
    assert!(matches!(client.ping(), Err(GridlockError::NotConnected)));

    client.shutdown().await;
}

#[tokio::test]
async fn transport_error_delivers_disconnected_with_reason() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    server.send_error("connection reset");
    match next_event(&mut events).await {
        GridlockEvent::Disconnected { reason } => {
            assert!(reason.unwrap().contains("connection reset"));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    client.shutdown().await;
}

#[tokio::test]
async fn ping_pong_heartbeat() {
    let (transport, mut server) = mock_connection();
    let (mut client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));

    establish_session(&mut server, &mut events).await;

    client.ping().unwrap();
    assert!(matches!(server.next_sent().await, ClientMessage::Ping));

    server.send(&ServerMessage::Pong);
    assert!(matches!(next_event(&mut events).await, GridlockEvent::Pong));

    client.shutdown().await;
}
