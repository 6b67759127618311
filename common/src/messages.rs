use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Inbound payload is not a JSON integer: {0}")]
pub struct ValueError(#[from] serde_json::Error);

// Every inbound websocket message is a bare JSON integer. Integers too large
// for i64 saturate, which keeps them out of every command's range.
pub fn decode_value(payload: &[u8]) -> Result<i64, ValueError> {
    match serde_json::from_slice::<i64>(payload) {
        Ok(value) => Ok(value),
        Err(e) if e.is_data() => match integer_literal(payload) {
            Some(true) => Ok(i64::MIN),
            Some(false) => Ok(i64::MAX),
            None => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

// Some(is_negative) when the payload is a plain `-?[0-9]+` literal
fn integer_literal(payload: &[u8]) -> Option<bool> {
    let literal = std::str::from_utf8(payload).ok()?.trim();
    let (negative, digits) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal),
    };
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(negative)
    } else {
        None
    }
}

// Broadcast to every connection once per tick
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub time: u32,
    pub is_turn: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClockStatus {
    pub time: u32,
    pub active_turns: Vec<u8>,
    pub enabled: bool,
    pub connections: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EnabledRequest {
    pub enabled: bool,
}
