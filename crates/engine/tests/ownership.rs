//! Attribution behaviour through the public `World` API: recording, guards,
//! resolution layers and blacklist self-healing.

use std::sync::{Arc, Mutex};

use tracker_engine::tracking::key::BlockKey;
use tracker_engine::tracking::resolver::{
    GameProfile, LookupQueue, NobodyOnline, ResolverSettings, UserOrigin, DEFAULT_INVALID_IDS,
};
use tracker_engine::tracking::{
    Actor, AttributionKind, IdentityIndex, IdentityResolver, OwnershipTable, Phase, PhaseTracker,
    Resolution, WorldRole, NO_INDEX,
};
use tracker_engine::world::position::{BlockPos, ChunkPos};
use tracker_engine::world::World;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SharedQueue(Arc<Mutex<Vec<Uuid>>>);

impl LookupQueue for SharedQueue {
    fn enqueue(&self, id: Uuid) -> bool {
        self.0.lock().unwrap().push(id);
        true
    }
}

fn detached_world() -> World {
    World::new(
        WorldRole::Authoritative,
        Arc::new(IdentityResolver::detached(ResolverSettings::default())),
    )
}

fn queued_world() -> (World, SharedQueue) {
    let queue = SharedQueue::default();
    let resolver = IdentityResolver::new(
        Arc::new(NobodyOnline),
        Box::new(queue.clone()),
        ResolverSettings::default(),
    );
    (World::new(WorldRole::Authoritative, Arc::new(resolver)), queue)
}

fn player(n: u128, name: &str) -> Actor {
    Actor::player(Uuid::from_u128(n), name)
}

// ---------------------------------------------------------------------------
// Codec and index
// ---------------------------------------------------------------------------

#[test]
fn codec_roundtrips_every_local_column() {
    for x in 0..16 {
        for z in 0..16 {
            for y in [-2048, -1, 0, 1, 128, 255, 256, 320, 4096] {
                let key = BlockKey::encode(x, y, z);
                assert_eq!(key.decode(), (x as u8, y, z as u8));
            }
        }
    }
}

#[test]
fn identity_indexing_is_idempotent_and_ordered() {
    let mut index = IdentityIndex::new();
    let ids: Vec<Uuid> = (1..=5).map(Uuid::from_u128).collect();
    let first: Vec<i32> = ids.iter().map(|id| index.index_for(*id)).collect();
    let second: Vec<i32> = ids.iter().map(|id| index.index_for(*id)).collect();
    assert_eq!(first, vec![0, 1, 2, 3, 4]);
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

#[test]
fn owner_is_also_notifier() {
    let world = detached_world();
    let phases = PhaseTracker::new();
    let alice = player(1, "alice");
    let pos = BlockPos::new(10, 64, -3);

    world.record_attribution(&phases, pos, &alice, AttributionKind::Owner);

    let owner = world.owner_of(pos).unwrap();
    let notifier = world.notifier_of(pos).unwrap();
    assert_eq!(owner.id, alice.id);
    assert_eq!(notifier.id, alice.id);
    assert_eq!(owner.name, "alice");
    assert_eq!(owner.origin, UserOrigin::UsernameCache);
}

#[test]
fn repeated_notifier_inserts_once() {
    let world = detached_world();
    let phases = PhaseTracker::new();
    let bob = player(2, "bob");
    let pos = BlockPos::new(0, 300, 0);

    assert!(world.record_attribution(&phases, pos, &bob, AttributionKind::Notifier));
    assert!(!world.record_attribution(&phases, pos, &bob, AttributionKind::Notifier));

    let stats = world.stats().snapshot();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.unchanged, 1);
    let table = world.table_snapshot(pos.chunk()).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(world.owner_of(pos), None);
}

#[test]
fn notifier_does_not_steal_ownership() {
    let world = detached_world();
    let phases = PhaseTracker::new();
    let alice = player(1, "alice");
    let bob = player(2, "bob");
    let pos = BlockPos::new(5, 5, 5);

    world.record_attribution(&phases, pos, &alice, AttributionKind::Owner);
    world.record_attribution(&phases, pos, &bob, AttributionKind::Notifier);

    assert_eq!(world.owner_of(pos).unwrap().id, alice.id);
    assert_eq!(world.notifier_of(pos).unwrap().id, bob.id);
}

#[test]
fn guards_suppress_recording() {
    let world = detached_world();
    let phases = PhaseTracker::new();
    let pos = BlockPos::new(1, 2, 3);

    let fake = Actor::synthetic(Uuid::from_u128(9), "[machine]");
    assert!(!world.record_attribution(&phases, pos, &fake, AttributionKind::Owner));

    {
        let _gen = phases.enter(Phase::WorldGeneration);
        assert!(!world.record_attribution(&phases, pos, &player(1, "alice"), AttributionKind::Owner));
    }

    assert!(world.tracker_at(pos).is_none());
    assert_eq!(world.stats().snapshot().suppressed, 2);
    assert_eq!(world.identity_count(), 0);
}

#[test]
fn neighbours_are_notified_only_when_tracked() {
    let world = detached_world();
    let phases = PhaseTracker::new();
    let alice = player(1, "alice");
    let bob = player(2, "bob");
    let center = BlockPos::new(15, 64, 15);
    let east = BlockPos::new(16, 64, 15);

    world.record_attribution(&phases, east, &alice, AttributionKind::Owner);
    let changed = world.notify_neighbors(&phases, center, &bob);

    assert_eq!(changed, 1);
    assert_eq!(world.notifier_of(east).unwrap().id, bob.id);
    assert_eq!(world.owner_of(east).unwrap().id, alice.id);
    assert!(world.tracker_at(BlockPos::new(14, 64, 15)).is_none());
}

// ---------------------------------------------------------------------------
// Administrative setters
// ---------------------------------------------------------------------------

#[test]
fn set_owner_bypasses_guards_and_clears() {
    let world = World::new(
        WorldRole::Sandbox,
        Arc::new(IdentityResolver::detached(ResolverSettings::default())),
    );
    let pos = BlockPos::new(-1, 10, -1);
    let id = Uuid::from_u128(77);

    world.set_owner(pos, Some(id));
    let tracker = world.tracker_at(pos).unwrap();
    assert_eq!(tracker.owner_index, 0);
    assert_eq!(tracker.notifier_index, NO_INDEX);

    world.set_owner(pos, None);
    assert_eq!(world.tracker_at(pos).unwrap().owner_index, NO_INDEX);
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[test]
fn blacklisted_owner_is_purged() {
    let world = detached_world();
    let pos = BlockPos::new(3, 70, 3);
    world.set_owner(pos, Some(DEFAULT_INVALID_IDS[0]));
    world.take_dirty_chunks();

    assert_eq!(world.owner_of(pos), None);
    assert!(world.tracker_at(pos).is_none());
    assert_eq!(world.stats().snapshot().purged, 1);
    assert_eq!(world.take_dirty_chunks(), vec![pos.chunk()]);
}

#[test]
fn unknown_user_is_queued_then_found_from_profile() {
    let (world, queue) = queued_world();
    let pos = BlockPos::new(0, 64, 0);
    let id = Uuid::from_u128(0xBEEF);
    world.set_owner(pos, Some(id));

    assert_eq!(world.attribution(pos, AttributionKind::Owner), Resolution::Pending(id));
    assert_eq!(world.owner_of(pos), None);
    assert_eq!(*queue.0.lock().unwrap(), vec![id]);

    world.resolver().finish_lookup(
        id,
        Some(GameProfile {
            id,
            name: "carol".into(),
            properties: Vec::new(),
        }),
    );
    let owner = world.owner_of(pos).unwrap();
    assert_eq!(owner.name, "carol");
    assert_eq!(owner.origin, UserOrigin::ProfileCache);
}

// ---------------------------------------------------------------------------
// Reloading
// ---------------------------------------------------------------------------

#[test]
fn tables_survive_a_reload() {
    let world = detached_world();
    let phases = PhaseTracker::new();
    let alice = player(1, "alice");
    let bob = player(2, "bob");
    let low = BlockPos::new(4, 12, 4);
    let high = BlockPos::new(4, 400, 4);
    let deep = BlockPos::new(4, -40, 4);

    world.record_attribution(&phases, low, &alice, AttributionKind::Owner);
    world.record_attribution(&phases, high, &bob, AttributionKind::Owner);
    world.record_attribution(&phases, deep, &bob, AttributionKind::Notifier);

    let chunk = ChunkPos::new(0, 0);
    let table = world.table_snapshot(chunk).unwrap();
    let short = table.short_entries();
    let int = table.int_entries();
    assert_eq!(short.len(), 1);
    assert_eq!(int.len(), 2);

    let fresh = World::new(WorldRole::Authoritative, Arc::clone(world.resolver()));
    assert!(fresh.load_identities(IdentityIndex::from_ids(world.identity_snapshot()).unwrap()));
    assert!(fresh.insert_table(chunk, OwnershipTable::from_parts(&short, &int).unwrap()));

    assert_eq!(fresh.dirty_count(), 0);
    assert_eq!(fresh.owner_of(low).unwrap().id, alice.id);
    assert_eq!(fresh.owner_of(high).unwrap().id, bob.id);
    assert_eq!(fresh.notifier_of(deep).unwrap().id, bob.id);
    assert_eq!(fresh.owner_of(deep), None);
}
