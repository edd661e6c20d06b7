//! Fuzz the server-message deserializer and the match-data decoder.
//!
//! Both take attacker-controlled bytes off the wire; neither may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

use gridlock_client::protocol::{MatchMessage, ServerMessage};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<ServerMessage>(text);
    }

    // Every defined opcode plus an out-of-range one.
    for op_code in [1, 2, 3, 4, 5, 6, 99] {
        let _ = MatchMessage::decode(op_code, data);
    }
});
