//! Process-wide room registry.
//!
//! Owns the room lifecycle: a room is created by the first join that
//! names it and deleted when its last member leaves. All operations take
//! the registry lock briefly; reads hand back owned snapshots so callers
//! never iterate under the lock.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::{ClientId, Room, RoomId};

/// Shared mapping from room id to room state.
///
/// # Thread Safety
///
/// A single `RwLock` guards the whole map. Mutations and snapshot reads
/// are atomic with respect to one another; fan-out deliberately happens
/// after the lock is released.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Room>>,

    /// History bound applied to every room created by this registry.
    history_capacity: usize,
}

impl RoomRegistry {
    /// Create a registry whose rooms retain at most `history_capacity` events.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            history_capacity,
        }
    }

    /// Insert a client into a room, creating the room if absent.
    ///
    /// Returns the room's member count after the insert.
    pub async fn add_member(&self, room_id: &RoomId, client_id: &ClientId) -> usize {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(room_id.clone())
            .or_insert_with(|| Room::new(room_id.clone(), self.history_capacity));
        room.insert_member(client_id.clone());
        room.member_count()
    }

    /// Remove a client from a room, deleting the room once empty.
    ///
    /// Returns true if the membership actually changed. No-op (false) when
    /// the room or the membership is absent.
    pub async fn remove_member(&self, room_id: &RoomId, client_id: &ClientId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };
        let removed = room.remove_member(client_id);
        if room.is_empty() {
            rooms.remove(room_id);
        }
        removed
    }

    /// Snapshot of a room's members; empty if the room is absent.
    pub async fn members_of(&self, room_id: &RoomId) -> Vec<ClientId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(Room::members_snapshot)
            .unwrap_or_default()
    }

    /// Current population of a room; 0 if absent.
    pub async fn user_count(&self, room_id: &RoomId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(Room::member_count).unwrap_or(0)
    }

    /// Every room containing the given client.
    ///
    /// The data model keeps a session in at most one room, but the
    /// contract stays a list; callers must iterate.
    pub async fn rooms_of(&self, client_id: &ClientId) -> Vec<RoomId> {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .filter(|room| room.contains(client_id))
            .map(|room| room.id().clone())
            .collect()
    }

    /// Append an event to a room's bounded history. No-op if absent.
    pub async fn append_history(&self, room_id: &RoomId, event: Value) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(room_id) {
            room.append_history(event);
        }
    }

    /// Snapshot of a room's history; empty if the room is absent.
    pub async fn history_of(&self, room_id: &RoomId) -> Vec<Value> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(Room::history_snapshot)
            .unwrap_or_default()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Drop every room. Used on shutdown.
    pub async fn clear(&self) {
        self.rooms.write().await.clear();
    }
}
