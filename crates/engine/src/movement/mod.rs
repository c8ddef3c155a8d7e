//! Per-connection movement handling.
//!
//! Every incoming position/rotation packet runs through a
//! [`MovementPipeline`], which decides whether the move is significant,
//! offers it to a [`MoveListener`] as a cancellable [`MoveEvent`], and
//! reports what the connection must tell the client.

pub mod event;
pub mod pipeline;

pub use event::{MoveEvent, MoveKind, MoveListener, Unobserved};
pub use pipeline::{MoveOutcome, MovementPipeline, MovementThresholds};

use glam::DVec3;

/// Where an entity is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: DVec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Transform {
    pub const fn new(position: DVec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch,
        }
    }

    pub const fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(DVec3::new(x, y, z), 0.0, 0.0)
    }

    pub fn with_position(self, position: DVec3) -> Self {
        Self { position, ..self }
    }

    pub fn with_rotation(self, yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch, ..self }
    }
}

/// A decoded client movement packet. When `moving` is false the position
/// fields carry garbage; likewise the angles when `rotating` is false.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovePacket {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub moving: bool,
    pub rotating: bool,
    pub on_ground: bool,
}

impl MovePacket {
    pub fn position(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            moving: true,
            ..Self::default()
        }
    }

    pub fn rotation(yaw: f32, pitch: f32) -> Self {
        Self {
            yaw,
            pitch,
            rotating: true,
            ..Self::default()
        }
    }

    pub fn full(x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> Self {
        Self {
            x,
            y,
            z,
            yaw,
            pitch,
            moving: true,
            rotating: true,
            on_ground: false,
        }
    }

    /// Every field the flags say is meaningful is finite.
    pub fn is_finite(&self) -> bool {
        let position_ok = !self.moving || (self.x.is_finite() && self.y.is_finite() && self.z.is_finite());
        let rotation_ok = !self.rotating || (self.yaw.is_finite() && self.pitch.is_finite());
        position_ok && rotation_ok
    }
}
