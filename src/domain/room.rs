//! Room record: membership set plus bounded relay history.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use super::{ClientId, RoomId};

/// A named membership group with a bounded FIFO of recently relayed events.
///
/// Rooms hold no transport handles; the registry owning them decides when
/// a room is created and when an empty room is deleted.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    members: HashSet<ClientId>,
    history: VecDeque<Value>,
    history_capacity: usize,
}

impl Room {
    /// Creates an empty room with the given history bound.
    pub fn new(id: RoomId, history_capacity: usize) -> Self {
        Self {
            id,
            members: HashSet::new(),
            history: VecDeque::with_capacity(history_capacity.min(64)),
            history_capacity,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Inserts a member. Returns true if the member was not already present.
    pub fn insert_member(&mut self, client_id: ClientId) -> bool {
        self.members.insert(client_id)
    }

    /// Removes a member. Returns true if the member was present.
    pub fn remove_member(&mut self, client_id: &ClientId) -> bool {
        self.members.remove(client_id)
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.members.contains(client_id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Owned copy of the membership, safe to iterate without the room.
    pub fn members_snapshot(&self) -> Vec<ClientId> {
        self.members.iter().cloned().collect()
    }

    /// Appends an event, dropping the oldest once past capacity.
    pub fn append_history(&mut self, event: Value) {
        self.history.push_back(event);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// Owned copy of the history in append order.
    pub fn history_snapshot(&self) -> Vec<Value> {
        self.history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
