//! Wire protocol between server and connected clients.
//!
//! Server frames are a tagged enum serialized as one JSON object per text
//! frame. Inbound client events are kept as raw `serde_json::Value` so
//! relays stay verbatim; the helpers here extract the fields the hub
//! inspects (`type`, and `roomId` on join).

use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::ClientState;

/// Event type tag of a join request.
pub const EVENT_JOIN: &str = "join";
/// Event type tag of a cursor update.
pub const EVENT_DRAW: &str = "draw";

// ============================================
// Server → Client Messages
// ============================================

/// All message types the server originates.
///
/// Relayed client events are not represented here: they are forwarded
/// verbatim as received.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First frame after a connection is admitted.
    Welcome {
        client_id: String,
        state: StateSnapshot,
    },

    /// Recent room events, sent to a joiner right after it joins.
    RoomHistory { room_id: String, history: Vec<Value> },

    /// Current population of a room, sent on every membership change.
    RoomUserCount { room_id: String, count: usize },

    /// Reply to a frame that could not be parsed as JSON.
    Error { message: String },
}

impl ServerMessage {
    /// Serializes to the single-frame JSON representation.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("server message serialization cannot fail")
    }
}

/// Wire form of a session's presentational state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub x: i64,
    pub y: i64,
    pub color: String,
    pub last_active: u64,
}

impl StateSnapshot {
    /// Captures the given state, stamping the current wall-clock millis.
    pub fn capture(state: &ClientState) -> Self {
        Self {
            x: state.x,
            y: state.y,
            color: state.color.clone(),
            last_active: unix_millis(),
        }
    }
}

/// Current wall-clock time as unix epoch milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ============================================
// Client → Server Events
// ============================================

/// The `type` tag of an inbound event, if present and a string.
pub fn event_type(event: &Value) -> Option<&str> {
    event.get("type").and_then(Value::as_str)
}

/// The `roomId` of a join event, if present and non-empty.
pub fn join_room_id(event: &Value) -> Option<&str> {
    event
        .get("roomId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
