//! Client sessions and the process-wide session directory.
//!
//! A session is the server's record of one live connection for one
//! client id. The directory enforces at most one live session per id:
//! inserting under an occupied id hands back the displaced session so
//! the hub can force-close its transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::{ClientId, ClientState, RoomId};
use crate::ports::Transport;

/// One live connection for one client id.
///
/// State is mutated only by the owning connection task; the heartbeat
/// scheduler reads the activity timestamp and the transport readiness.
/// The inner locks are never held across an await point.
pub struct ClientSession {
    client_id: ClientId,
    transport: Arc<dyn Transport>,
    state: Mutex<ClientState>,
    room_id: Mutex<Option<RoomId>>,
    last_active: Mutex<Instant>,
}

impl ClientSession {
    /// Creates a session with fresh presentational state (random color).
    pub fn new(client_id: ClientId, transport: Arc<dyn Transport>) -> Self {
        Self {
            client_id,
            transport,
            state: Mutex::new(ClientState::new()),
            room_id: Mutex::new(None),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Marks the session active now.
    pub fn touch(&self) {
        *self.last_active.lock().expect("last_active lock poisoned") = Instant::now();
    }

    /// Time elapsed since the last inbound message or pong.
    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .expect("last_active lock poisoned")
            .elapsed()
    }

    /// Whether the session has been active within the given threshold.
    pub fn is_alive(&self, threshold: Duration) -> bool {
        self.idle_for() <= threshold
    }

    /// Owned copy of the presentational state.
    pub fn state_snapshot(&self) -> ClientState {
        self.state.lock().expect("state lock poisoned").clone()
    }

    /// Folds a `draw` event into the state.
    ///
    /// Coordinates are taken only when integral; `color` only when a
    /// string is present. Unrecognized fields are ignored, the event
    /// itself is relayed verbatim elsewhere.
    pub fn apply_draw(&self, event: &Value) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if let Some(x) = event.get("x").and_then(Value::as_i64) {
            state.x = x;
        }
        if let Some(y) = event.get("y").and_then(Value::as_i64) {
            state.y = y;
        }
        if let Some(color) = event.get("color").and_then(Value::as_str) {
            state.color = color.to_string();
        }
    }

    /// The room this session currently occupies, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id.lock().expect("room_id lock poisoned").clone()
    }

    /// Replaces the current room, returning the previous one.
    pub fn set_room(&self, room_id: Option<RoomId>) -> Option<RoomId> {
        std::mem::replace(
            &mut *self.room_id.lock().expect("room_id lock poisoned"),
            room_id,
        )
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("client_id", &self.client_id)
            .field("room_id", &self.room_id())
            .finish_non_exhaustive()
    }
}

/// Shared mapping from client id to its single live session.
#[derive(Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<ClientId, Arc<ClientSession>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session, returning the one it displaced, if any.
    pub async fn insert(&self, session: Arc<ClientSession>) -> Option<Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.client_id().clone(), session)
    }

    /// Looks up the live session for a client id.
    pub async fn get(&self, client_id: &ClientId) -> Option<Arc<ClientSession>> {
        self.sessions.read().await.get(client_id).cloned()
    }

    /// Removes and returns the session for a client id.
    pub async fn remove(&self, client_id: &ClientId) -> Option<Arc<ClientSession>> {
        self.sessions.write().await.remove(client_id)
    }

    /// Removes the entry only if it still holds this exact session.
    ///
    /// A displaced session's close runs after its successor was admitted
    /// under the same id; matching on identity keeps that close from
    /// evicting the successor.
    pub async fn remove_exact(&self, session: &Arc<ClientSession>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session.client_id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.client_id());
                true
            }
            _ => false,
        }
    }

    /// Owned snapshot of every live session.
    pub async fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drains every session. Used on shutdown.
    pub async fn clear(&self) -> Vec<Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, session)| session).collect()
    }
}
