//! Wire-format tests: envelope shape, opcode payloads, and error codes.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use gridlock_client::error_codes::ErrorCode;
use gridlock_client::protocol::{
    opcodes, ChatPayload, ClientMessage, GameOverPayload, GameStatus, Mark, MatchMessage,
    MovePayload, PlayerJoinedPayload, Presence, ServerMessage, StateUpdatePayload,
};
use gridlock_client::GridlockError;

use serde_json::{json, Value};
use uuid::Uuid;

fn uid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

// ── Envelope shape ──────────────────────────────────────────────────

#[test]
fn client_messages_use_tagged_envelopes() {
    let msg = ClientMessage::JoinMatch {
        match_id: "m1".into(),
        token: Some("jt".into()),
    };
    let value: Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "JoinMatch");
    assert_eq!(value["data"]["match_id"], "m1");
    assert_eq!(value["data"]["token"], "jt");
}

#[test]
fn authenticate_carries_device_id_and_username() {
    let msg = ClientMessage::Authenticate {
        device_id: uid(7),
        create: true,
        username: "alice".into(),
    };
    let value: Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "Authenticate");
    assert_eq!(value["data"]["username"], "alice");
    assert_eq!(value["data"]["create"], true);
    // Uuid serializes as hyphenated string.
    assert_eq!(
        value["data"]["device_id"],
        "00000000-0000-0000-0000-000000000007"
    );
}

#[test]
fn server_match_joined_uses_self_key() {
    let text = r#"{
        "type": "MatchJoined",
        "data": {
            "match_id": "m1",
            "self": {"user_id": "00000000-0000-0000-0000-000000000001", "username": "alice"},
            "presences": [
                {"user_id": "00000000-0000-0000-0000-000000000001", "username": "alice"},
                {"user_id": "00000000-0000-0000-0000-000000000002", "username": "bob"}
            ]
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(text).unwrap();
    match msg {
        ServerMessage::MatchJoined {
            match_id,
            self_presence,
            presences,
        } => {
            assert_eq!(match_id, "m1");
            assert_eq!(self_presence.username, "alice");
            assert_eq!(presences.len(), 2);
        }
        other => panic!("expected MatchJoined, got {other:?}"),
    }
}

#[test]
fn match_joined_presences_default_to_empty() {
    let text = r#"{
        "type": "MatchJoined",
        "data": {
            "match_id": "m1",
            "self": {"user_id": "00000000-0000-0000-0000-000000000001", "username": "alice"}
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(text).unwrap();
    match msg {
        ServerMessage::MatchJoined { presences, .. } => assert!(presences.is_empty()),
        other => panic!("expected MatchJoined, got {other:?}"),
    }
}

#[test]
fn unit_variants_round_trip() {
    for msg in [ClientMessage::Ping] {
        let text = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&text).unwrap();
        assert!(matches!(back, ClientMessage::Ping));
    }
    let text = serde_json::to_string(&ServerMessage::Pong).unwrap();
    assert!(matches!(
        serde_json::from_str::<ServerMessage>(&text).unwrap(),
        ServerMessage::Pong
    ));
    let text = serde_json::to_string(&ServerMessage::MatchLeft).unwrap();
    assert!(matches!(
        serde_json::from_str::<ServerMessage>(&text).unwrap(),
        ServerMessage::MatchLeft
    ));
}

#[test]
fn unknown_server_message_type_fails_to_parse() {
    let text = r#"{"type": "SomethingNew", "data": {}}"#;
    assert!(serde_json::from_str::<ServerMessage>(text).is_err());
}

// ── Match-data payloads ─────────────────────────────────────────────

#[test]
fn opcode_constants_match_wire_values() {
    assert_eq!(opcodes::MOVE, 1);
    assert_eq!(opcodes::STATE_UPDATE, 2);
    assert_eq!(opcodes::GAME_OVER, 3);
    assert_eq!(opcodes::PLAYER_JOINED, 4);
    assert_eq!(opcodes::ERROR, 5);
    assert_eq!(opcodes::CHAT, 6);
}

#[test]
fn match_message_op_codes_align_with_payloads() {
    let cases: Vec<(MatchMessage, i64)> = vec![
        (MatchMessage::Move(MovePayload { position: 0 }), 1),
        (
            MatchMessage::StateUpdate(StateUpdatePayload {
                board: vec![None; 9],
                current_player: None,
                game_status: GameStatus::Waiting,
            }),
            2,
        ),
        (
            MatchMessage::GameOver(GameOverPayload {
                winner: None,
                reason: None,
            }),
            3,
        ),
        (
            MatchMessage::PlayerJoined(PlayerJoinedPayload {
                player: "bob".into(),
                game_status: None,
            }),
            4,
        ),
        (
            MatchMessage::Error(gridlock_client::protocol::ErrorPayload {
                error: "nope".into(),
            }),
            5,
        ),
        (
            MatchMessage::Chat(ChatPayload {
                sender: "alice".into(),
                message: "hi".into(),
            }),
            6,
        ),
    ];
    for (msg, expected) in cases {
        assert_eq!(msg.op_code(), expected, "{msg:?}");
        let bytes = msg.encode().unwrap();
        let back = MatchMessage::decode(expected, &bytes).unwrap();
        assert_eq!(back, msg);
    }
}

#[test]
fn state_update_payload_uses_camel_case() {
    let payload = StateUpdatePayload {
        board: vec![Some(Mark::X), None, Some(Mark::O)],
        current_player: Some(uid(1)),
        game_status: GameStatus::Active,
    };
    let value: Value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["board"][0], "X");
    assert_eq!(value["board"][1], Value::Null);
    assert_eq!(value["board"][2], "O");
    assert_eq!(value["currentPlayer"], "00000000-0000-0000-0000-000000000001");
    assert_eq!(value["gameStatus"], "active");
}

#[test]
fn state_update_tolerates_missing_current_player() {
    let value = json!({
        "board": [null, null, null, null, null, null, null, null, null],
        "gameStatus": "waiting"
    });
    let payload: StateUpdatePayload = serde_json::from_value(value).unwrap();
    assert_eq!(payload.current_player, None);
    assert_eq!(payload.game_status, GameStatus::Waiting);
}

#[test]
fn game_over_payload_fields_are_optional() {
    let payload: GameOverPayload = serde_json::from_value(json!({})).unwrap();
    assert_eq!(payload.winner, None);
    assert_eq!(payload.reason, None);

    let payload: GameOverPayload = serde_json::from_value(json!({
        "winner": "00000000-0000-0000-0000-000000000002",
        "reason": "win"
    }))
    .unwrap();
    assert_eq!(payload.winner, Some(uid(2)));
    assert_eq!(payload.reason.as_deref(), Some("win"));
}

#[test]
fn decode_rejects_unknown_opcode() {
    let result = MatchMessage::decode(42, b"{}");
    assert!(matches!(result, Err(GridlockError::UnknownOpCode(42))));
}

#[test]
fn decode_rejects_malformed_payload() {
    let result = MatchMessage::decode(opcodes::MOVE, b"not json");
    assert!(matches!(result, Err(GridlockError::Serialization(_))));
}

// ── Enums and scalar types ──────────────────────────────────────────

#[test]
fn game_status_serializes_lowercase() {
    assert_eq!(
        serde_json::to_value(GameStatus::Waiting).unwrap(),
        json!("waiting")
    );
    assert_eq!(
        serde_json::to_value(GameStatus::Active).unwrap(),
        json!("active")
    );
    assert_eq!(
        serde_json::to_value(GameStatus::Ended).unwrap(),
        json!("ended")
    );
}

#[test]
fn mark_opponent_flips() {
    assert_eq!(Mark::X.opponent(), Mark::O);
    assert_eq!(Mark::O.opponent(), Mark::X);
}

#[test]
fn error_codes_serialize_screaming_snake_case() {
    assert_eq!(
        serde_json::to_value(ErrorCode::UsernameConflict).unwrap(),
        json!("USERNAME_CONFLICT")
    );
    assert_eq!(
        serde_json::to_value(ErrorCode::NotYourTurn).unwrap(),
        json!("NOT_YOUR_TURN")
    );
    assert_eq!(
        serde_json::to_value(ErrorCode::MatchFull).unwrap(),
        json!("MATCH_FULL")
    );
    let back: ErrorCode = serde_json::from_value(json!("CELL_OCCUPIED")).unwrap();
    assert_eq!(back, ErrorCode::CellOccupied);
}

#[test]
fn error_codes_have_descriptions() {
    assert!(!ErrorCode::UsernameConflict.description().is_empty());
    assert!(!ErrorCode::InternalError.description().is_empty());
    // Display goes through the description.
    assert_eq!(
        ErrorCode::UsernameConflict.to_string(),
        ErrorCode::UsernameConflict.description()
    );
}

#[test]
fn leaderboard_records_tolerate_sparse_fields() {
    let text = r#"{
        "type": "LeaderboardRecords",
        "data": {"records": [{"username": "bob"}, {"score": 3, "rank": 2}]}
    }"#;
    let msg: ServerMessage = serde_json::from_str(text).unwrap();
    match msg {
        ServerMessage::LeaderboardRecords { records } => {
            assert_eq!(records[0].username.as_deref(), Some("bob"));
            assert_eq!(records[0].score, 0);
            assert_eq!(records[1].score, 3);
            assert_eq!(records[1].rank, Some(2));
            assert_eq!(records[1].username, None);
        }
        other => panic!("expected LeaderboardRecords, got {other:?}"),
    }
}

#[test]
fn presence_round_trips() {
    let presence = Presence {
        user_id: uid(9),
        username: "carol".into(),
    };
    let text = serde_json::to_string(&presence).unwrap();
    let back: Presence = serde_json::from_str(&text).unwrap();
    assert_eq!(back, presence);
}
