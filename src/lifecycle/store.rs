use std::collections::HashMap;
use std::time::SystemTime;

use crate::event::CorrelationId;
use crate::track::ObjectId;

/// Ephemeral metadata for one active identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleEntry {
    pub created_at: SystemTime,
    /// Last zone the object was observed in, if any.
    pub last_zone: Option<String>,
    /// Correlation id of the open entry/exit event pair.
    pub event_id: Option<CorrelationId>,
}

/// At most one live entry per identifier.
#[derive(Debug, Default)]
pub struct LifecycleStore {
    entries: HashMap<ObjectId, LifecycleEntry>,
}

impl LifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh entry for `id`, returning any entry it replaced.
    pub fn create(&mut self, id: ObjectId, created_at: SystemTime) -> Option<LifecycleEntry> {
        self.entries.insert(
            id,
            LifecycleEntry {
                created_at,
                last_zone: None,
                event_id: None,
            },
        )
    }

    pub fn get(&self, id: ObjectId) -> Option<&LifecycleEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut LifecycleEntry> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<LifecycleEntry> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active identifiers in ascending order.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
