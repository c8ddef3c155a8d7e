//! Shared registry of connected players.
//!
//! Backs the resolver's "online" layer and broadcasts join/leave/move events
//! so every connection can tell its client about the others.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use uuid::Uuid;

use tracker_engine::movement::Transform;
use tracker_engine::tracking::resolver::{OnlineUsers, TrackedUser};

/// Capacity of the lifecycle channel. Moves dominate: ~20 per player per second.
const EVENT_CAPACITY: usize = 512;

#[derive(Clone, Debug)]
pub struct PlayerInfo {
    pub conn_id: u64,
    pub uuid: Uuid,
    pub name: String,
    pub transform: Transform,
}

#[derive(Clone, Debug)]
pub enum PlayerEvent {
    Joined {
        conn_id: u64,
        uuid: Uuid,
        name: String,
        transform: Transform,
    },
    Left {
        conn_id: u64,
        uuid: Uuid,
    },
    Moved {
        conn_id: u64,
        uuid: Uuid,
        transform: Transform,
    },
}

impl PlayerEvent {
    pub fn conn_id(&self) -> u64 {
        match self {
            PlayerEvent::Joined { conn_id, .. }
            | PlayerEvent::Left { conn_id, .. }
            | PlayerEvent::Moved { conn_id, .. } => *conn_id,
        }
    }
}

/// Thread-safe registry of all connected players.
///
/// Uses `std::sync::RwLock` because every operation is brief (no awaits while
/// the lock is held) and the access pattern is read-heavy.
pub struct PlayerRegistry {
    players: RwLock<HashMap<u64, PlayerInfo>>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            players: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Register a player and broadcast `PlayerEvent::Joined`.
    pub fn register(&self, info: PlayerInfo) {
        let event = PlayerEvent::Joined {
            conn_id: info.conn_id,
            uuid: info.uuid,
            name: info.name.clone(),
            transform: info.transform,
        };
        self.players
            .write()
            .expect("player registry poisoned")
            .insert(info.conn_id, info);
        // Best-effort: if no subscribers yet, the send fails silently.
        let _ = self.event_tx.send(event);
    }

    pub fn update_transform(&self, conn_id: u64, transform: Transform) {
        let uuid = {
            let mut players = self.players.write().expect("player registry poisoned");
            let Some(info) = players.get_mut(&conn_id) else {
                return;
            };
            info.transform = transform;
            info.uuid
        };
        let _ = self.event_tx.send(PlayerEvent::Moved {
            conn_id,
            uuid,
            transform,
        });
    }

    /// Remove a player and broadcast `PlayerEvent::Left`.
    pub fn deregister(&self, conn_id: u64) -> Option<PlayerInfo> {
        let info = self
            .players
            .write()
            .expect("player registry poisoned")
            .remove(&conn_id)?;
        let _ = self.event_tx.send(PlayerEvent::Left {
            conn_id: info.conn_id,
            uuid: info.uuid,
        });
        Some(info)
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<PlayerInfo> {
        self.players
            .read()
            .expect("player registry poisoned")
            .values()
            .find(|p| p.uuid == *uuid)
            .cloned()
    }

    /// Snapshot of all currently registered players.
    pub fn snapshot(&self) -> Vec<PlayerInfo> {
        self.players
            .read()
            .expect("player registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().expect("player registry poisoned").len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineUsers for PlayerRegistry {
    fn online_user(&self, id: &Uuid) -> Option<TrackedUser> {
        self.find_by_uuid(id)
            .map(|info| TrackedUser::online(info.uuid, info.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_engine::tracking::resolver::UserOrigin;

    fn info(conn_id: u64, name: &str) -> PlayerInfo {
        PlayerInfo {
            conn_id,
            uuid: Uuid::from_u128(conn_id as u128),
            name: name.into(),
            transform: Transform::at(0.0, 64.0, 0.0),
        }
    }

    #[test]
    fn online_layer_sees_registered_players() {
        let registry = PlayerRegistry::new();
        registry.register(info(7, "alice"));
        let user = registry.online_user(&Uuid::from_u128(7)).unwrap();
        assert_eq!(user.name, "alice");
        assert_eq!(user.origin, UserOrigin::Online);

        registry.deregister(7);
        assert!(registry.online_user(&Uuid::from_u128(7)).is_none());
        assert_eq!(registry.player_count(), 0);
    }

    #[test]
    fn lifecycle_events_are_broadcast() {
        let registry = PlayerRegistry::new();
        let mut rx = registry.subscribe();
        registry.register(info(1, "alice"));
        registry.update_transform(1, Transform::at(1.0, 64.0, 0.0));
        registry.update_transform(99, Transform::at(0.0, 0.0, 0.0));
        registry.deregister(1);

        assert!(matches!(rx.try_recv().unwrap(), PlayerEvent::Joined { conn_id: 1, .. }));
        assert!(matches!(rx.try_recv().unwrap(), PlayerEvent::Moved { conn_id: 1, .. }));
        assert!(matches!(rx.try_recv().unwrap(), PlayerEvent::Left { conn_id: 1, .. }));
        assert!(rx.try_recv().is_err());
    }
}
