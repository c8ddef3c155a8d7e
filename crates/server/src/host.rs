//! The main simulation thread.
//!
//! All world and movement state is owned here. Network tasks only send
//! [`Inbound`] messages; this thread drains them in order, together with a
//! fixed tick that drives autosave.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, select, tick};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use tracker_engine::movement::{MoveOutcome, MovementPipeline, MovementThresholds, Transform};
use tracker_engine::tracking::{
    Actor, AttributionKind, IdentityResolver, Phase, PhaseTracker, WorldRole,
};
use tracker_engine::world::World;
use tracker_engine::world::position::BlockPos;

use crate::config::TrackerConfig;
use crate::event_bus::{EventBus, WorldBorder};
use crate::net::protocol::{ClientMessage, ServerMessage, UserSummary};
use crate::persistence;
use crate::player_registry::{PlayerInfo, PlayerRegistry};
use crate::usercache;

/// Main-thread tick period.
pub const TICK: Duration = Duration::from_millis(50);

/// Everything a network task can tell the main thread.
#[derive(Debug)]
pub enum Inbound {
    Join {
        conn_id: u64,
        name: String,
        uuid: Uuid,
        outbound: UnboundedSender<ServerMessage>,
    },
    Leave {
        conn_id: u64,
    },
    Packet {
        conn_id: u64,
        message: ClientMessage,
    },
}

#[derive(Debug, Clone)]
pub struct HostSettings {
    pub role: WorldRole,
    pub world_dir: PathBuf,
    pub usercache: PathBuf,
    pub autosave_interval: Option<Duration>,
    pub border_radius: f64,
    pub thresholds: MovementThresholds,
    pub spawn: Transform,
    /// Names allowed to send attribution overrides.
    pub operators: HashSet<String>,
}

impl HostSettings {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            role: config.world.role.into(),
            world_dir: config.world.directory.clone(),
            usercache: config.tracking.usercache.clone(),
            autosave_interval: config.world.autosave_interval(),
            border_radius: config.world.border_radius,
            thresholds: config.movement.thresholds(),
            spawn: Transform::at(0.5, 64.0, 0.5),
            operators: config.server.operators.iter().cloned().collect(),
        }
    }
}

struct Session {
    actor: Actor,
    pipeline: MovementPipeline,
    outbound: UnboundedSender<ServerMessage>,
}

impl Session {
    fn send(&self, message: ServerMessage) {
        // The connection may already be closing; its Leave is on the way.
        let _ = self.outbound.send(message);
    }
}

pub struct Host {
    world: World,
    phases: PhaseTracker,
    sessions: HashMap<u64, Session>,
    registry: Arc<PlayerRegistry>,
    bus: EventBus,
    settings: HostSettings,
    last_save: Instant,
}

impl Host {
    /// Build a host around a fresh world bound to the calling thread.
    pub fn new(
        settings: HostSettings,
        resolver: Arc<IdentityResolver>,
        registry: Arc<PlayerRegistry>,
    ) -> Self {
        let mut bus = EventBus::new();
        if settings.border_radius > 0.0 {
            bus.register(WorldBorder::new(settings.border_radius));
        }
        Self {
            world: World::new(settings.role, resolver),
            phases: PhaseTracker::new(),
            sessions: HashMap::new(),
            registry,
            bus,
            settings,
            last_save: Instant::now(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn transform_of(&self, conn_id: u64) -> Option<Transform> {
        self.sessions.get(&conn_id).map(|s| s.pipeline.transform())
    }

    /// Load saved tracking data. Runs inside the chunk-load phase so nothing
    /// it touches is attributed.
    pub fn load(&self) -> Result<usize> {
        let _phase = self.phases.enter(Phase::ChunkLoad);
        persistence::load_into(&self.world, &self.settings.world_dir)
    }

    /// Write dirty chunk tables, the identity table and the username cache.
    pub fn save(&mut self) -> Result<usize> {
        self.last_save = Instant::now();
        let chunks = persistence::save_world(&self.world, &self.settings.world_dir)?;
        usercache::save(self.world.resolver(), &self.settings.usercache)?;
        Ok(chunks)
    }

    /// Drain `inbox` until it disconnects or `shutdown` fires, then save.
    pub fn run(mut self, inbox: Receiver<Inbound>, shutdown: Receiver<()>) -> Result<()> {
        let ticker = tick(TICK);
        tracing::info!("Main thread running");
        loop {
            select! {
                recv(inbox) -> msg => match msg {
                    Ok(inbound) => self.handle(inbound),
                    Err(_) => break,
                },
                recv(ticker) -> _ => self.tick(),
                recv(shutdown) -> _ => break,
            }
        }

        tracing::info!("Saving tracking data before exit...");
        let chunks = self.save()?;
        tracing::info!("Shutdown save complete: {} chunks written", chunks);
        Ok(())
    }

    pub fn tick(&mut self) {
        let Some(interval) = self.settings.autosave_interval else {
            return;
        };
        if self.last_save.elapsed() < interval {
            return;
        }
        tracing::info!("Autosaving...");
        match self.save() {
            Ok(n) => {
                let stats = self.world.stats().snapshot();
                tracing::info!(
                    "Autosave complete: {} chunks ({} tracked chunks, {} writes, {} suppressed, {} purged)",
                    n,
                    self.world.chunk_count(),
                    stats.writes(),
                    stats.suppressed,
                    stats.purged
                );
            }
            Err(e) => tracing::error!("Autosave failed: {:#}", e),
        }
    }

    pub fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Join {
                conn_id,
                name,
                uuid,
                outbound,
            } => self.join(conn_id, name, uuid, outbound),
            Inbound::Leave { conn_id } => self.leave(conn_id),
            Inbound::Packet { conn_id, message } => self.packet(conn_id, message),
        }
    }

    fn join(&mut self, conn_id: u64, name: String, uuid: Uuid, outbound: UnboundedSender<ServerMessage>) {
        if self.sessions.contains_key(&conn_id) {
            tracing::warn!("Duplicate join for connection {}", conn_id);
            return;
        }
        let spawn = self.settings.spawn;
        self.world.resolver().remember_name(uuid, &name);

        let session = Session {
            actor: Actor::player(uuid, name.clone()),
            pipeline: MovementPipeline::new(spawn, self.settings.thresholds),
            outbound,
        };
        session.send(ServerMessage::welcome(uuid, spawn));
        for other in self.registry.snapshot() {
            session.send(ServerMessage::PlayerJoined {
                uuid: other.uuid,
                name: other.name,
            });
        }
        self.sessions.insert(conn_id, session);
        self.registry.register(PlayerInfo {
            conn_id,
            uuid,
            name: name.clone(),
            transform: spawn,
        });
        tracing::info!("{} joined the game", name);
    }

    fn leave(&mut self, conn_id: u64) {
        if self.sessions.remove(&conn_id).is_some() {
            self.registry.deregister(conn_id);
        }
    }

    fn packet(&mut self, conn_id: u64, message: ClientMessage) {
        let Some(session) = self.sessions.get_mut(&conn_id) else {
            tracing::debug!("Packet from unknown connection {}", conn_id);
            return;
        };

        if let Some(packet) = message.move_packet() {
            let outcome = session.pipeline.handle(&packet, &mut self.bus);
            match outcome {
                MoveOutcome::Rejected { resync } | MoveOutcome::Redirected { resync } => {
                    session.send(ServerMessage::position(resync));
                    self.registry.update_transform(conn_id, resync);
                }
                MoveOutcome::Accepted | MoveOutcome::Moved(_) => {
                    self.registry
                        .update_transform(conn_id, session.pipeline.transform());
                }
                MoveOutcome::Ignored | MoveOutcome::Superseded => {}
            }
            return;
        }

        match message {
            ClientMessage::Place { x, y, z } => {
                let pos = BlockPos::new(x, y, z);
                let _phase = self.phases.enter(Phase::PlayerInteraction);
                self.world
                    .record_attribution(&self.phases, pos, &session.actor, AttributionKind::Owner);
                let notified = self.world.notify_neighbors(&self.phases, pos, &session.actor);
                tracing::debug!("{} placed at {:?} ({} neighbours notified)", session.actor.name, pos, notified);
            }
            ClientMessage::Interact { x, y, z } => {
                let _phase = self.phases.enter(Phase::PlayerInteraction);
                self.world.record_attribution(
                    &self.phases,
                    BlockPos::new(x, y, z),
                    &session.actor,
                    AttributionKind::Notifier,
                );
            }
            ClientMessage::Inspect { x, y, z } => {
                let pos = BlockPos::new(x, y, z);
                session.send(ServerMessage::Attribution {
                    x,
                    y,
                    z,
                    owner: self.world.owner_of(pos).map(UserSummary::from),
                    notifier: self.world.notifier_of(pos).map(UserSummary::from),
                });
            }
            ClientMessage::SetOwner { .. } | ClientMessage::SetNotifier { .. }
                if !self.settings.operators.contains(&session.actor.name) =>
            {
                tracing::warn!(
                    "{} tried to override attribution without operator rights",
                    session.actor.name
                );
            }
            ClientMessage::SetOwner { x, y, z, owner } => {
                let _phase = self.phases.enter(Phase::PluginApi);
                tracing::info!("{} set owner of ({}, {}, {}) to {:?}", session.actor.name, x, y, z, owner);
                self.world.set_owner(BlockPos::new(x, y, z), owner);
            }
            ClientMessage::SetNotifier { x, y, z, notifier } => {
                let _phase = self.phases.enter(Phase::PluginApi);
                self.world.set_notifier(BlockPos::new(x, y, z), notifier);
            }
            ClientMessage::Spawn => {
                let spawn = self.settings.spawn;
                session.pipeline.teleport(spawn);
                session.send(ServerMessage::position(spawn));
                self.registry.update_transform(conn_id, spawn);
            }
            ClientMessage::Hello { .. } | ClientMessage::Move { .. } => {}
        }
    }
}

/// Start the main thread. The world is created on it, loaded, then driven by
/// [`Host::run`].
pub fn spawn(
    settings: HostSettings,
    resolver: Arc<IdentityResolver>,
    registry: Arc<PlayerRegistry>,
    inbox: Receiver<Inbound>,
    shutdown: Receiver<()>,
) -> std::io::Result<JoinHandle<Result<()>>> {
    thread::Builder::new()
        .name("server-main".into())
        .spawn(move || {
            let host = Host::new(settings, resolver, registry);
            match host.load() {
                Ok(0) => tracing::info!("No saved tracking data found"),
                Ok(n) => tracing::info!("Loaded tracking for {} chunks", n),
                Err(e) => tracing::error!("Failed to load tracking data: {:#}", e),
            }
            host.run(inbox, shutdown)
        })
}
