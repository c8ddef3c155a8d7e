//! Main-thread behaviour driven through `Inbound` messages, plus one full
//! round trip over TCP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use tracker_engine::movement::{MovementThresholds, Transform};
use tracker_engine::tracking::resolver::{ResolverSettings, DEFAULT_INVALID_IDS};
use tracker_engine::tracking::{IdentityResolver, WorldRole};
use tracker_engine::world::position::BlockPos;
use tracker_server::host::{self, Host, HostSettings, Inbound};
use tracker_server::net::connection::offline_uuid;
use tracker_server::net::protocol::{ClientMessage, ServerMessage};
use tracker_server::player_registry::PlayerRegistry;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn settings(dir: &str) -> HostSettings {
    let world_dir = std::env::temp_dir().join(dir);
    let _ = std::fs::remove_dir_all(&world_dir);
    HostSettings {
        role: WorldRole::Authoritative,
        usercache: world_dir.join("usercache.json"),
        world_dir,
        autosave_interval: None,
        border_radius: 100.0,
        thresholds: MovementThresholds::default(),
        spawn: Transform::at(0.5, 64.0, 0.5),
        operators: ["alice".to_string()].into_iter().collect(),
    }
}

fn host_with(settings: HostSettings) -> (Host, Arc<PlayerRegistry>) {
    let registry = Arc::new(PlayerRegistry::new());
    let resolver = Arc::new(IdentityResolver::new(
        registry.clone(),
        Box::new(tracker_engine::tracking::resolver::DetachedQueue),
        ResolverSettings::default(),
    ));
    (Host::new(settings, resolver, Arc::clone(&registry)), registry)
}

struct Client {
    conn_id: u64,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn join(host: &mut Host, conn_id: u64, name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        host.handle(Inbound::Join {
            conn_id,
            name: name.into(),
            uuid: offline_uuid(name),
            outbound: tx,
        });
        Self { conn_id, rx }
    }

    fn send(&self, host: &mut Host, message: ClientMessage) {
        host.handle(Inbound::Packet {
            conn_id: self.conn_id,
            message,
        });
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn inspect(&mut self, host: &mut Host, pos: BlockPos) -> ServerMessage {
        self.drain();
        self.send(host, ClientMessage::Inspect { x: pos.x, y: pos.y, z: pos.z });
        self.drain().pop().expect("no reply to inspect")
    }
}

fn names(reply: &ServerMessage) -> (Option<String>, Option<String>) {
    match reply {
        ServerMessage::Attribution { owner, notifier, .. } => (
            owner.as_ref().map(|u| u.name.clone()),
            notifier.as_ref().map(|u| u.name.clone()),
        ),
        other => panic!("expected attribution, got {:?}", other),
    }
}

fn some(name: &str) -> Option<String> {
    Some(name.to_string())
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[test]
fn join_sends_welcome_at_spawn() {
    let (mut host, registry) = host_with(settings("tracker_host_join"));
    let mut alice = Client::join(&mut host, 1, "alice");

    let messages = alice.drain();
    assert!(matches!(
        messages.first(),
        Some(ServerMessage::Welcome { x, .. }) if *x == 0.5
    ));
    assert_eq!(host.session_count(), 1);
    assert_eq!(registry.player_count(), 1);

    host.handle(Inbound::Leave { conn_id: 1 });
    assert_eq!(host.session_count(), 0);
    assert_eq!(registry.player_count(), 0);
}

#[test]
fn place_and_interact_are_attributed() {
    let (mut host, _registry) = host_with(settings("tracker_host_attr"));
    let mut alice = Client::join(&mut host, 1, "alice");
    let bob = Client::join(&mut host, 2, "bob");

    let pos = BlockPos::new(4, 63, -9);
    alice.send(&mut host, ClientMessage::Place { x: 4, y: 63, z: -9 });
    assert_eq!(names(&alice.inspect(&mut host, pos)), (some("alice"), some("alice")));

    bob.send(&mut host, ClientMessage::Interact { x: 4, y: 63, z: -9 });
    assert_eq!(names(&alice.inspect(&mut host, pos)), (some("alice"), some("bob")));

    // Placing next to a tracked block notifies it.
    bob.send(&mut host, ClientMessage::Place { x: 5, y: 63, z: -9 });
    alice.send(&mut host, ClientMessage::Interact { x: 4, y: 63, z: -9 });
    bob.send(&mut host, ClientMessage::Place { x: 3, y: 63, z: -9 });
    assert_eq!(names(&alice.inspect(&mut host, pos)), (some("alice"), some("bob")));
}

#[test]
fn operator_overrides_and_blacklist() {
    let (mut host, _registry) = host_with(settings("tracker_host_admin"));
    let mut alice = Client::join(&mut host, 1, "alice");
    let pos = BlockPos::new(0, 70, 0);

    alice.send(&mut host, ClientMessage::SetOwner { x: 0, y: 70, z: 0, owner: Some(offline_uuid("alice")) });
    assert_eq!(names(&alice.inspect(&mut host, pos)), (some("alice"), None));

    alice.send(&mut host, ClientMessage::SetOwner { x: 0, y: 70, z: 0, owner: Some(DEFAULT_INVALID_IDS[2]) });
    assert_eq!(names(&alice.inspect(&mut host, pos)), (None, None));
    assert!(host.world().tracker_at(pos).is_none());
}

#[test]
fn overrides_from_non_operators_are_ignored() {
    let (mut host, _registry) = host_with(settings("tracker_host_non_op"));
    let mut alice = Client::join(&mut host, 1, "alice");
    let mallory = Client::join(&mut host, 2, "mallory");
    let pos = BlockPos::new(1, 64, 1);

    alice.send(&mut host, ClientMessage::Place { x: 1, y: 64, z: 1 });
    mallory.send(&mut host, ClientMessage::SetOwner { x: 1, y: 64, z: 1, owner: Some(offline_uuid("mallory")) });
    mallory.send(&mut host, ClientMessage::SetNotifier { x: 1, y: 64, z: 1, notifier: None });
    assert_eq!(names(&alice.inspect(&mut host, pos)), (some("alice"), some("alice")));
}

#[test]
fn placing_at_the_coordinate_limit_keeps_the_host_alive() {
    let (mut host, _registry) = host_with(settings("tracker_host_edge"));
    let mut alice = Client::join(&mut host, 1, "alice");

    alice.send(&mut host, ClientMessage::Place { x: i32::MAX, y: 64, z: 0 });
    alice.send(&mut host, ClientMessage::Place { x: i32::MAX - 1, y: 64, z: 0 });
    alice.send(&mut host, ClientMessage::Place { x: 0, y: i32::MAX, z: i32::MIN });

    let edge = BlockPos::new(i32::MAX, 64, 0);
    assert_eq!(names(&alice.inspect(&mut host, edge)), (some("alice"), some("alice")));
    let high = BlockPos::new(0, i32::MAX, i32::MIN);
    assert_eq!(names(&alice.inspect(&mut host, high)), (None, None));
    assert_eq!(host.session_count(), 1);
}

#[test]
fn moves_across_the_border_are_rolled_back() {
    let (mut host, registry) = host_with(settings("tracker_host_border"));
    let mut alice = Client::join(&mut host, 1, "alice");
    alice.drain();

    let step = |x: f64| ClientMessage::Move {
        x: Some(x),
        y: Some(64.0),
        z: Some(0.5),
        yaw: None,
        pitch: None,
        on_ground: true,
    };

    alice.send(&mut host, step(50.0));
    assert!(alice.drain().is_empty());
    assert_eq!(host.transform_of(1).unwrap().position.x, 50.0);

    alice.send(&mut host, step(150.0));
    let replies = alice.drain();
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::Position { x, .. }] if *x == 50.0
    ));
    assert_eq!(host.transform_of(1).unwrap().position.x, 50.0);
    assert_eq!(registry.snapshot()[0].transform.position.x, 50.0);

    alice.send(&mut host, ClientMessage::Spawn);
    assert!(matches!(alice.drain().as_slice(), [ServerMessage::Position { x, .. }] if *x == 0.5));
}

#[test]
fn attribution_survives_restart() {
    let settings = settings("tracker_host_restart");
    let world_dir: PathBuf = settings.world_dir.clone();
    let pos = BlockPos::new(-20, 300, 40);

    {
        let (mut host, _registry) = host_with(settings.clone());
        let alice = Client::join(&mut host, 1, "alice");
        alice.send(&mut host, ClientMessage::Place { x: pos.x, y: pos.y, z: pos.z });
        host.handle(Inbound::Leave { conn_id: 1 });
        assert_eq!(host.save().unwrap(), 1);
    }
    assert!(settings.usercache.exists());

    let (mut host, _registry) = host_with(settings.clone());
    tracker_server::usercache::load(host.world().resolver(), &settings.usercache).unwrap();
    assert_eq!(host.load().unwrap(), 1);
    assert_eq!(host.world().owner_of(pos).unwrap().id, offline_uuid("alice"));

    let mut bob = Client::join(&mut host, 7, "bob");
    assert_eq!(names(&bob.inspect(&mut host, pos)), (some("alice"), some("alice")));

    let _ = std::fs::remove_dir_all(&world_dir);
}

// ---------------------------------------------------------------------------
// Over the wire
// ---------------------------------------------------------------------------

async fn next_message(
    lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
) -> ServerMessage {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for server")
        .unwrap()
        .expect("server closed the connection");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn tcp_round_trip() {
    let settings = settings("tracker_host_tcp");
    let world_dir = settings.world_dir.clone();

    let registry = Arc::new(PlayerRegistry::new());
    let resolver = Arc::new(IdentityResolver::detached(ResolverSettings::default()));
    let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let main_thread =
        host::spawn(settings, resolver, Arc::clone(&registry), inbox_rx, shutdown_rx).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tracker_server::net::listener::serve(listener, inbox_tx, registry));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write.write_all(b"{\"type\":\"hello\",\"name\":\"alice\"}\n").await.unwrap();
    match next_message(&mut lines).await {
        ServerMessage::Welcome { uuid, .. } => assert_eq!(uuid, offline_uuid("alice")),
        other => panic!("expected welcome, got {:?}", other),
    }

    write.write_all(b"this is not json\n").await.unwrap();
    write.write_all(b"{\"type\":\"place\",\"x\":1,\"y\":64,\"z\":1}\n").await.unwrap();
    write.write_all(b"{\"type\":\"inspect\",\"x\":1,\"y\":64,\"z\":1}\n").await.unwrap();
    let reply = next_message(&mut lines).await;
    assert_eq!(names(&reply), (some("alice"), some("alice")));
    if let ServerMessage::Attribution { owner, .. } = reply {
        assert_eq!(owner.unwrap().uuid, offline_uuid("alice"));
    }

    drop(write);
    shutdown_tx.send(()).unwrap();
    let joined = tokio::task::spawn_blocking(move || main_thread.join()).await.unwrap();
    assert!(joined.unwrap().is_ok());
    assert!(world_dir.join("tracking/r.0.0.mca").exists());

    let _ = std::fs::remove_dir_all(&world_dir);
}
