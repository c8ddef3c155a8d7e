//! Per-world dense index of user identities.
//!
//! Trackers store small integers instead of 16-byte UUIDs. The index is
//! append-only: an id keeps its index for as long as the world's data is
//! loaded, and the persisted table is the ordered list of ids.

use indexmap::IndexSet;
use uuid::Uuid;

use super::error::TrackingError;

/// Sentinel meaning "nobody" in a tracker field.
pub const NO_INDEX: i32 = -1;

#[derive(Debug, Default, Clone)]
pub struct IdentityIndex {
    ids: IndexSet<Uuid>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted table; position in `ids` becomes the index.
    pub fn from_ids(ids: impl IntoIterator<Item = Uuid>) -> Result<Self, TrackingError> {
        let mut set = IndexSet::new();
        for (position, id) in ids.into_iter().enumerate() {
            let (existing, inserted) = set.insert_full(id);
            if !inserted {
                return Err(TrackingError::DuplicateIdentity {
                    id,
                    first: existing,
                    second: position,
                });
            }
        }
        Ok(Self { ids: set })
    }

    /// Index for `id`, appending it if this is its first appearance.
    pub fn index_for(&mut self, id: Uuid) -> i32 {
        let (index, _) = self.ids.insert_full(id);
        index as i32
    }

    /// Index for `id` without inserting.
    pub fn get_index(&self, id: &Uuid) -> Option<i32> {
        self.ids.get_index_of(id).map(|i| i as i32)
    }

    pub fn id_for(&self, index: i32) -> Option<Uuid> {
        if index < 0 {
            return None;
        }
        self.ids.get_index(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in index order (the persisted form).
    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.ids.iter().copied()
    }
}
