//! Wire format: one JSON object per line, tagged by `"type"`.
//!
//! ```text
//! > {"type":"hello","name":"alice"}
//! < {"type":"welcome","uuid":"...","x":0.5,"y":64.0,"z":0.5,"yaw":0.0,"pitch":0.0}
//! > {"type":"move","x":1.5,"y":64.0,"z":0.5}
//! > {"type":"place","x":1,"y":63,"z":0}
//! > {"type":"inspect","x":1,"y":63,"z":0}
//! < {"type":"attribution","x":1,"y":63,"z":0,"owner":{"uuid":"...","name":"alice"},...}
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tracker_engine::movement::{MovePacket, Transform};
use tracker_engine::tracking::TrackedUser;
use tracker_engine::world::position::BlockPos;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        name: String,
    },
    /// Position fields are all present or the packet does not move; same for
    /// the two angles.
    Move {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        z: Option<f64>,
        #[serde(default)]
        yaw: Option<f32>,
        #[serde(default)]
        pitch: Option<f32>,
        #[serde(default)]
        on_ground: bool,
    },
    /// Put a block down: the sender becomes its owner.
    Place { x: i32, y: i32, z: i32 },
    /// Poke a block (press a button, trip a wire): the sender becomes its notifier.
    Interact { x: i32, y: i32, z: i32 },
    Inspect { x: i32, y: i32, z: i32 },
    /// Operator override. `owner: null` clears it.
    SetOwner {
        x: i32,
        y: i32,
        z: i32,
        owner: Option<Uuid>,
    },
    SetNotifier {
        x: i32,
        y: i32,
        z: i32,
        notifier: Option<Uuid>,
    },
    /// Ask to be sent back to spawn.
    Spawn,
}

impl ClientMessage {
    pub fn move_packet(&self) -> Option<MovePacket> {
        let ClientMessage::Move {
            x,
            y,
            z,
            yaw,
            pitch,
            on_ground,
        } = *self
        else {
            return None;
        };
        let position = match (x, y, z) {
            (Some(x), Some(y), Some(z)) => Some((x, y, z)),
            _ => None,
        };
        let rotation = match (yaw, pitch) {
            (Some(yaw), Some(pitch)) => Some((yaw, pitch)),
            _ => None,
        };
        let (x, y, z) = position.unwrap_or_default();
        let (yaw, pitch) = rotation.unwrap_or_default();
        Some(MovePacket {
            x,
            y,
            z,
            yaw,
            pitch,
            moving: position.is_some(),
            rotating: rotation.is_some(),
            on_ground,
        })
    }

    pub fn block_pos(&self) -> Option<BlockPos> {
        match *self {
            ClientMessage::Place { x, y, z }
            | ClientMessage::Interact { x, y, z }
            | ClientMessage::Inspect { x, y, z }
            | ClientMessage::SetOwner { x, y, z, .. }
            | ClientMessage::SetNotifier { x, y, z, .. } => Some(BlockPos::new(x, y, z)),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub uuid: Uuid,
    pub name: String,
}

impl From<TrackedUser> for UserSummary {
    fn from(user: TrackedUser) -> Self {
        Self {
            uuid: user.id,
            name: user.name,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        uuid: Uuid,
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
    },
    /// Authoritative position; the client must snap to it.
    Position {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
    },
    Attribution {
        x: i32,
        y: i32,
        z: i32,
        owner: Option<UserSummary>,
        notifier: Option<UserSummary>,
    },
    PlayerJoined {
        uuid: Uuid,
        name: String,
    },
    PlayerMoved {
        uuid: Uuid,
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
    },
    PlayerLeft {
        uuid: Uuid,
    },
    Disconnect {
        reason: String,
    },
}

impl ServerMessage {
    pub fn position(t: Transform) -> Self {
        ServerMessage::Position {
            x: t.position.x,
            y: t.position.y,
            z: t.position.z,
            yaw: t.yaw,
            pitch: t.pitch,
        }
    }

    pub fn welcome(uuid: Uuid, t: Transform) -> Self {
        ServerMessage::Welcome {
            uuid,
            x: t.position.x,
            y: t.position.y,
            z: t.position.z,
            yaw: t.yaw,
            pitch: t.pitch,
        }
    }
}
