//! Per-chunk ownership/notifier attribution store.
//!
//! Two maps keyed by [`BlockKey`]: one for short keys (0 <= y < 256), one for
//! int keys (everything else). A position lives in exactly one of them.

use std::collections::HashMap;

use super::error::TrackingError;
use super::identity::{IdentityIndex, NO_INDEX};
use super::key::BlockKey;
use super::resolver::{IdentityResolver, Resolution};
use crate::world::position::LocalBlockPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributionKind {
    /// Directly caused the block's current state.
    Owner,
    /// Most recently triggered a side effect on the block.
    Notifier,
}

/// Who owns / last notified a position, as indices into the world's
/// [`IdentityIndex`]. [`NO_INDEX`] means nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerTracker {
    pub owner_index: i32,
    pub notifier_index: i32,
}

impl PlayerTracker {
    pub const EMPTY: PlayerTracker = PlayerTracker {
        owner_index: NO_INDEX,
        notifier_index: NO_INDEX,
    };

    /// A fresh tracker for a first attribution. An owner is also the notifier.
    pub const fn new(index: i32, kind: AttributionKind) -> Self {
        match kind {
            AttributionKind::Owner => Self {
                owner_index: index,
                notifier_index: index,
            },
            AttributionKind::Notifier => Self {
                owner_index: NO_INDEX,
                notifier_index: index,
            },
        }
    }

    pub const fn index(&self, kind: AttributionKind) -> i32 {
        match kind {
            AttributionKind::Owner => self.owner_index,
            AttributionKind::Notifier => self.notifier_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Updated,
    /// The stored attribution already matched.
    Unchanged,
}

/// One map's worth of trackers as parallel arrays, the persisted form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSection {
    pub keys: Vec<i32>,
    pub owners: Vec<i32>,
    pub notifiers: Vec<i32>,
}

impl TrackerSection {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    fn check_lengths(&self, section: &'static str) -> Result<(), TrackingError> {
        if self.owners.len() != self.keys.len() || self.notifiers.len() != self.keys.len() {
            return Err(TrackingError::MismatchedArrays {
                section,
                keys: self.keys.len(),
                owners: self.owners.len(),
                notifiers: self.notifiers.len(),
            });
        }
        Ok(())
    }

    fn entries(&self) -> impl Iterator<Item = (i32, PlayerTracker)> + '_ {
        self.keys
            .iter()
            .zip(self.owners.iter().zip(&self.notifiers))
            .map(|(&key, (&owner_index, &notifier_index))| {
                (
                    key,
                    PlayerTracker {
                        owner_index,
                        notifier_index,
                    },
                )
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipTable {
    short_positions: HashMap<u16, PlayerTracker>,
    int_positions: HashMap<u32, PlayerTracker>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from its two persisted sections.
    pub fn from_parts(short: &TrackerSection, int: &TrackerSection) -> Result<Self, TrackingError> {
        short.check_lengths("short")?;
        int.check_lengths("int")?;

        let mut table = Self::new();
        for (raw, tracker) in short.entries() {
            let key = u16::try_from(raw).map_err(|_| TrackingError::ShortKeyOverflow { key: raw })?;
            table.short_positions.insert(key, tracker);
        }
        for (key, tracker) in int.entries() {
            let key = key as u32;
            let (_, y, _) = BlockKey::Int(key).decode();
            if BlockKey::is_short_height(y) {
                return Err(TrackingError::KeyOutOfSection {
                    section: "int",
                    key,
                    y,
                });
            }
            table.int_positions.insert(key, tracker);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.short_positions.len() + self.int_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.short_positions.is_empty() && self.int_positions.is_empty()
    }

    pub fn tracker(&self, pos: LocalBlockPos) -> Option<PlayerTracker> {
        match BlockKey::for_local(pos) {
            BlockKey::Short(key) => self.short_positions.get(&key).copied(),
            BlockKey::Int(key) => self.int_positions.get(&key).copied(),
        }
    }

    /// Attribute `pos` to `index`. Setting an owner also makes it the notifier.
    pub fn record(&mut self, pos: LocalBlockPos, index: i32, kind: AttributionKind) -> RecordOutcome {
        let slot = self.slot(pos);
        match slot {
            Some(tracker) => {
                let unchanged = match kind {
                    AttributionKind::Owner => {
                        tracker.owner_index == index && tracker.notifier_index == index
                    }
                    AttributionKind::Notifier => tracker.notifier_index == index,
                };
                if unchanged {
                    return RecordOutcome::Unchanged;
                }
                if kind == AttributionKind::Owner {
                    tracker.owner_index = index;
                }
                tracker.notifier_index = index;
                RecordOutcome::Updated
            }
            None => {
                self.insert(pos, PlayerTracker::new(index, kind));
                RecordOutcome::Inserted
            }
        }
    }

    /// Overwrite a single field, creating the tracker if needed. No
    /// de-duplication and no owner-implies-notifier coupling.
    pub fn set(&mut self, pos: LocalBlockPos, kind: AttributionKind, index: i32) {
        let tracker = match self.slot(pos) {
            Some(tracker) => tracker,
            None => {
                self.insert(pos, PlayerTracker::EMPTY);
                match self.slot(pos) {
                    Some(tracker) => tracker,
                    None => return,
                }
            }
        };
        match kind {
            AttributionKind::Owner => tracker.owner_index = index,
            AttributionKind::Notifier => tracker.notifier_index = index,
        }
    }

    pub fn remove(&mut self, pos: LocalBlockPos) -> Option<PlayerTracker> {
        match BlockKey::for_local(pos) {
            BlockKey::Short(key) => self.short_positions.remove(&key),
            BlockKey::Int(key) => self.int_positions.remove(&key),
        }
    }

    /// Resolve the user attributed to `pos`. A blacklisted id removes the
    /// whole tracker before reporting [`Resolution::Invalid`].
    pub fn resolve(
        &mut self,
        pos: LocalBlockPos,
        kind: AttributionKind,
        identities: &IdentityIndex,
        resolver: &IdentityResolver,
    ) -> Resolution {
        let Some(tracker) = self.tracker(pos) else {
            return Resolution::Unknown;
        };
        let resolution = resolver.resolve(tracker.index(kind), identities);
        if let Resolution::Invalid(_) = resolution {
            self.remove(pos);
        }
        resolution
    }

    pub fn owner_of(
        &mut self,
        pos: LocalBlockPos,
        identities: &IdentityIndex,
        resolver: &IdentityResolver,
    ) -> Resolution {
        self.resolve(pos, AttributionKind::Owner, identities, resolver)
    }

    pub fn notifier_of(
        &mut self,
        pos: LocalBlockPos,
        identities: &IdentityIndex,
        resolver: &IdentityResolver,
    ) -> Resolution {
        self.resolve(pos, AttributionKind::Notifier, identities, resolver)
    }

    /// Highest identity index referenced by any tracker.
    pub fn max_index(&self) -> i32 {
        self.short_positions
            .values()
            .chain(self.int_positions.values())
            .map(|t| t.owner_index.max(t.notifier_index))
            .max()
            .unwrap_or(NO_INDEX)
    }

    pub fn entries(&self) -> impl Iterator<Item = (LocalBlockPos, PlayerTracker)> + '_ {
        let short = self
            .short_positions
            .iter()
            .map(|(&key, &t)| (BlockKey::Short(key).to_local(), t));
        let int = self
            .int_positions
            .iter()
            .map(|(&key, &t)| (BlockKey::Int(key).to_local(), t));
        short.chain(int)
    }

    pub fn short_entries(&self) -> TrackerSection {
        section_of(self.short_positions.iter().map(|(&k, t)| (k as i32, *t)))
    }

    pub fn int_entries(&self) -> TrackerSection {
        section_of(self.int_positions.iter().map(|(&k, t)| (k as i32, *t)))
    }

    fn slot(&mut self, pos: LocalBlockPos) -> Option<&mut PlayerTracker> {
        match BlockKey::for_local(pos) {
            BlockKey::Short(key) => self.short_positions.get_mut(&key),
            BlockKey::Int(key) => self.int_positions.get_mut(&key),
        }
    }

    fn insert(&mut self, pos: LocalBlockPos, tracker: PlayerTracker) {
        match BlockKey::for_local(pos) {
            BlockKey::Short(key) => {
                self.short_positions.insert(key, tracker);
            }
            BlockKey::Int(key) => {
                self.int_positions.insert(key, tracker);
            }
        }
    }
}

fn section_of(entries: impl Iterator<Item = (i32, PlayerTracker)>) -> TrackerSection {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_unstable_by_key(|(key, _)| *key);
    let mut section = TrackerSection::default();
    for (key, tracker) in entries {
        section.keys.push(key);
        section.owners.push(tracker.owner_index);
        section.notifiers.push(tracker.notifier_index);
    }
    section
}
