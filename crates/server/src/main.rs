use std::path::PathBuf;
use std::sync::Arc;

use tracker_engine::tracking::IdentityResolver;
use tracker_server::config::TrackerConfig;
use tracker_server::host::{self, HostSettings};
use tracker_server::player_registry::PlayerRegistry;
use tracker_server::profile_lookup::{self, JsonDirectory};
use tracker_server::usercache;

fn arg(flag: &str) -> Option<String> {
    std::env::args().skip_while(|a| a != flag).nth(1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let demo_mode = std::env::args().any(|a| a == "--demo");
    let config_path: PathBuf = arg("--config").unwrap_or_else(|| "tracker.toml".into()).into();

    let mut config = TrackerConfig::load_or_default(&config_path)?;
    if let Some(bind) = arg("--bind") {
        config.server.bind = bind;
    }
    if let Some(world) = arg("--world") {
        config.world.directory = world.into();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    if demo_mode {
        run_demo(&config);
        return Ok(());
    }

    tracing::info!("Attribution tracker server");

    // ── Identity resolution: online set, caches, background lookups ────
    let registry = Arc::new(PlayerRegistry::new());
    let (queue, queue_rx) = profile_lookup::channel();
    let resolver = Arc::new(IdentityResolver::new(
        registry.clone(),
        Box::new(queue),
        config.tracking.resolver_settings(),
    ));

    match usercache::load(&resolver, &config.tracking.usercache) {
        Ok(n) => tracing::info!("Username cache: {} entries", n),
        Err(e) => tracing::warn!("Ignoring unreadable username cache: {:#}", e),
    }
    let directory = JsonDirectory::load(&config.tracking.profile_directory).unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable profile directory: {:#}", e);
        JsonDirectory::default()
    });
    profile_lookup::start(&resolver, Arc::new(directory), queue_rx);

    // ── Main thread ─────────────────────────────────────────────────────
    let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let main_thread = host::spawn(
        HostSettings::from_config(&config),
        Arc::clone(&resolver),
        Arc::clone(&registry),
        inbox_rx,
        shutdown_rx,
    )?;

    // ── Start listener with graceful shutdown ──────────────────────────
    tracing::info!("Starting server on {}", config.server.bind);

    tokio::select! {
        result = tracker_server::net::listener::run(&config.server.bind, inbox_tx, Arc::clone(&registry)) => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
    }

    // ── Save on shutdown (the main thread saves as it exits) ───────────
    let _ = shutdown_tx.send(());
    match tokio::task::spawn_blocking(move || main_thread.join()).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!("Shutdown save failed: {:#}", e),
        Ok(Err(_)) => tracing::error!("Main thread panicked"),
        Err(e) => tracing::error!("Failed to join main thread: {}", e),
    }
    Ok(())
}

/// Scripted walk-through of attribution and movement, no network.
fn run_demo(config: &TrackerConfig) {
    use tracker_engine::movement::{MoveOutcome, MovePacket, MovementPipeline, Transform};
    use tracker_engine::tracking::resolver::DEFAULT_INVALID_IDS;
    use tracker_engine::tracking::{Actor, AttributionKind, Phase, PhaseTracker, WorldRole};
    use tracker_engine::world::World;
    use tracker_engine::world::position::BlockPos;
    use tracker_server::event_bus::{EventBus, WorldBorder};
    use tracker_server::net::connection::offline_uuid;

    tracing::info!("Attribution tracker -- offline demo");

    let resolver = Arc::new(IdentityResolver::detached(config.tracking.resolver_settings()));
    let world = World::new(WorldRole::Authoritative, resolver);
    let phases = PhaseTracker::new();
    let alice = Actor::player(offline_uuid("alice"), "alice");
    let bob = Actor::player(offline_uuid("bob"), "bob");

    {
        let _gen = phases.enter(Phase::WorldGeneration);
        for x in 0..16 {
            world.record_attribution(&phases, BlockPos::new(x, 63, 0), &alice, AttributionKind::Owner);
        }
        tracing::info!("Terrain generated: {} tracked chunks", world.chunk_count());
    }

    let lever = BlockPos::new(2, 64, 0);
    let wire = BlockPos::new(3, 64, 0);
    world.record_attribution(&phases, wire, &alice, AttributionKind::Owner);
    world.record_attribution(&phases, lever, &alice, AttributionKind::Owner);
    world.record_attribution(&phases, lever, &bob, AttributionKind::Notifier);
    let notified = world.notify_neighbors(&phases, lever, &bob);

    for pos in [lever, wire] {
        tracing::info!(
            "{:?}: owner={:?} notifier={:?}",
            pos,
            world.owner_of(pos).map(|u| u.name),
            world.notifier_of(pos).map(|u| u.name)
        );
    }
    tracing::info!("{} neighbour(s) notified by the lever", notified);

    let poisoned = BlockPos::new(5, 64, 5);
    world.set_owner(poisoned, Some(DEFAULT_INVALID_IDS[0]));
    let owner = world.owner_of(poisoned);
    tracing::info!(
        "Blacklisted owner resolved to {:?}; tracker still present: {}",
        owner,
        world.tracker_at(poisoned).is_some()
    );

    let mut bus = EventBus::new();
    bus.register(WorldBorder::new(10.0));
    let mut pipeline = MovementPipeline::new(Transform::at(0.5, 64.0, 0.5), config.movement.thresholds());
    for packet in [
        MovePacket::position(0.5, 64.0, 0.53),
        MovePacket::position(0.5, 64.0, 0.6),
        MovePacket::rotation(90.0, 0.0),
        MovePacket::position(20.0, 64.0, 0.6),
    ] {
        let outcome = pipeline.handle(&packet, &mut bus);
        match outcome {
            MoveOutcome::Rejected { resync } => {
                tracing::info!("{:?} -> rejected, resync to {:?}", packet, resync.position)
            }
            other => tracing::info!("{:?} -> {:?}", packet, other),
        }
    }

    let stats = world.stats().snapshot();
    tracing::info!(
        "Stats: {} inserted, {} updated, {} unchanged, {} suppressed, {} purged",
        stats.inserted,
        stats.updated,
        stats.unchanged,
        stats.suppressed,
        stats.purged
    );
}
