pub mod position;

use std::backtrace::Backtrace;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use dashmap::{DashMap, DashSet};
use position::{BlockPos, ChunkPos};
use uuid::Uuid;

use crate::tracking::resolver::{IdentityResolver, Resolution, TrackedUser};
use crate::tracking::stats::TrackerStats;
use crate::tracking::{
    Actor, AttributionKind, BlockKey, IdentityIndex, NO_INDEX, OwnershipTable, PhaseTracker,
    PlayerTracker, RecordOutcome, WorldRole,
};

/// Attribution state of one world. Thread-safe, lock-sharded by chunk.
///
/// Owns one [`OwnershipTable`] per chunk that has ever been attributed, plus
/// the world's [`IdentityIndex`]. Writes are expected from the thread that
/// created the world; bulk loads from any other thread are refused (see
/// [`World::insert_table`]).
pub struct World {
    role: WorldRole,
    tables: DashMap<ChunkPos, OwnershipTable>,
    /// Chunks that have been modified since the last save.
    dirty: DashSet<ChunkPos>,
    identities: RwLock<IdentityIndex>,
    resolver: Arc<IdentityResolver>,
    stats: TrackerStats,
    main_thread: ThreadId,
}

impl World {
    /// Create an empty world bound to the calling thread.
    pub fn new(role: WorldRole, resolver: Arc<IdentityResolver>) -> Self {
        Self {
            role,
            tables: DashMap::new(),
            dirty: DashSet::new(),
            identities: RwLock::new(IdentityIndex::new()),
            resolver,
            stats: TrackerStats::new(),
            main_thread: thread::current().id(),
        }
    }

    pub fn role(&self) -> WorldRole {
        self.role
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.resolver
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    // ── Attribution ─────────────────────────────────────────────────────

    /// Attribute the block at `pos` to `actor`. Returns `true` if a tracker
    /// was inserted or changed.
    ///
    /// Skipped entirely on non-authoritative worlds, during phases that do
    /// not track, and for synthetic actors.
    pub fn record_attribution(
        &self,
        phases: &PhaseTracker,
        pos: BlockPos,
        actor: &Actor,
        kind: AttributionKind,
    ) -> bool {
        if !self.role.tracks() || !phases.is_tracking() || actor.synthetic {
            self.stats.suppressed();
            return false;
        }
        if !BlockKey::is_encodable_height(pos.y) {
            tracing::debug!("Not tracking {:?}: height out of range", pos);
            return false;
        }

        self.resolver.remember_name(actor.id, &actor.name);
        let index = self.identities_mut().index_for(actor.id);

        let chunk = pos.chunk();
        let outcome = self
            .tables
            .entry(chunk)
            .or_default()
            .record(pos.local(), index, kind);
        self.stats.record(outcome);

        let changed = outcome != RecordOutcome::Unchanged;
        if changed {
            self.dirty.insert(chunk);
        }
        changed
    }

    /// Mark every already-tracked cardinal neighbour of `pos` as notified by
    /// `actor`. Returns how many trackers changed.
    pub fn notify_neighbors(&self, phases: &PhaseTracker, pos: BlockPos, actor: &Actor) -> usize {
        pos.neighbors()
            .filter(|n| self.tracker_at(*n).is_some())
            .filter(|n| self.record_attribution(phases, *n, actor, AttributionKind::Notifier))
            .count()
    }

    pub fn owner_of(&self, pos: BlockPos) -> Option<TrackedUser> {
        self.attribution(pos, AttributionKind::Owner).user()
    }

    pub fn notifier_of(&self, pos: BlockPos) -> Option<TrackedUser> {
        self.attribution(pos, AttributionKind::Notifier).user()
    }

    /// Resolve the owner or notifier of `pos`, keeping the resolver's reason
    /// for absence. A blacklisted id purges the tracker.
    pub fn attribution(&self, pos: BlockPos, kind: AttributionKind) -> Resolution {
        if !BlockKey::is_encodable_height(pos.y) {
            return Resolution::Unknown;
        }
        let identities = self.identities();
        let chunk = pos.chunk();
        let Some(mut table) = self.tables.get_mut(&chunk) else {
            return Resolution::Unknown;
        };
        let resolution = table.resolve(pos.local(), kind, &identities, &self.resolver);
        if let Resolution::Invalid(id) = resolution {
            tracing::debug!("Purged tracker at {:?}: {} is blacklisted", pos, id);
            self.stats.purged();
            self.dirty.insert(chunk);
        }
        resolution
    }

    /// Administrative override of the owner. `None` clears it. Bypasses the
    /// role, phase and actor guards.
    pub fn set_owner(&self, pos: BlockPos, id: Option<Uuid>) {
        self.set_attribution(pos, AttributionKind::Owner, id);
    }

    /// Administrative override of the notifier. `None` clears it.
    pub fn set_notifier(&self, pos: BlockPos, id: Option<Uuid>) {
        self.set_attribution(pos, AttributionKind::Notifier, id);
    }

    fn set_attribution(&self, pos: BlockPos, kind: AttributionKind, id: Option<Uuid>) {
        if !BlockKey::is_encodable_height(pos.y) {
            tracing::debug!("Ignoring override at {:?}: height out of range", pos);
            return;
        }
        let index = match id {
            Some(id) => self.identities_mut().index_for(id),
            None if self.tracker_at(pos).is_none() => return,
            None => NO_INDEX,
        };
        let chunk = pos.chunk();
        self.tables
            .entry(chunk)
            .or_default()
            .set(pos.local(), kind, index);
        self.dirty.insert(chunk);
    }

    pub fn tracker_at(&self, pos: BlockPos) -> Option<PlayerTracker> {
        if !BlockKey::is_encodable_height(pos.y) {
            return None;
        }
        self.tables.get(&pos.chunk())?.tracker(pos.local())
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Replace the world's identity table. Must run before any chunk table
    /// is inserted. Refused off the world's thread.
    pub fn load_identities(&self, identities: IdentityIndex) -> bool {
        if !self.on_world_thread("load identity table", None) {
            return false;
        }
        *self.identities_mut() = identities;
        true
    }

    /// Insert a chunk table read from disk, without marking it dirty.
    ///
    /// Called from any thread other than the world's own, this logs the
    /// violation with a backtrace and skips the insert instead of panicking.
    pub fn insert_table(&self, pos: ChunkPos, table: OwnershipTable) -> bool {
        if !self.on_world_thread("insert chunk table", Some(pos)) {
            return false;
        }
        let known = self.identities().len() as i32;
        let max = table.max_index();
        if max >= known {
            tracing::warn!(
                "Chunk ({}, {}) references identity index {} but only {} identities are loaded",
                pos.x,
                pos.z,
                max,
                known
            );
        }
        self.tables.insert(pos, table);
        true
    }

    fn on_world_thread(&self, operation: &str, chunk: Option<ChunkPos>) -> bool {
        let current = thread::current();
        if current.id() == self.main_thread {
            return true;
        }
        let coords = match chunk {
            Some(pos) => format!("({}, {})", pos.x, pos.z),
            None => "-".to_string(),
        };
        tracing::error!(
            "Refusing to {} from thread {:?} ({:?}), chunk {}: world tables are owned by {:?}\n{}",
            operation,
            current.name().unwrap_or("<unnamed>"),
            current.id(),
            coords,
            self.main_thread,
            Backtrace::force_capture()
        );
        false
    }

    // ── Persistence views ───────────────────────────────────────────────

    pub fn chunk_count(&self) -> usize {
        self.tables.len()
    }

    pub fn table_snapshot(&self, pos: ChunkPos) -> Option<OwnershipTable> {
        self.tables.get(&pos).map(|t| t.clone())
    }

    /// Ordered identity list; position in the list is the index.
    pub fn identity_snapshot(&self) -> Vec<Uuid> {
        self.identities().ids().collect()
    }

    pub fn identity_count(&self) -> usize {
        self.identities().len()
    }

    /// Drain and return all chunk positions that have been modified since the
    /// last call. After this returns, the dirty set is empty.
    pub fn take_dirty_chunks(&self) -> Vec<ChunkPos> {
        let dirty: Vec<ChunkPos> = self.dirty.iter().map(|p| *p).collect();
        for pos in &dirty {
            self.dirty.remove(pos);
        }
        dirty
    }

    /// Put chunks back on the dirty list, e.g. after a failed save.
    pub fn mark_dirty(&self, chunks: impl IntoIterator<Item = ChunkPos>) {
        for pos in chunks {
            self.dirty.insert(pos);
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    // Poisoning is ignored: the index is append-only.
    fn identities(&self) -> RwLockReadGuard<'_, IdentityIndex> {
        self.identities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn identities_mut(&self) -> RwLockWriteGuard<'_, IdentityIndex> {
        self.identities.write().unwrap_or_else(PoisonError::into_inner)
    }
}
