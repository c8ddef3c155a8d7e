use glam::DVec3;

use super::event::{MoveEvent, MoveKind, MoveListener};
use super::{MovePacket, Transform};

/// Squared thresholds below which a move is too small to fire an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementThresholds {
    pub min_move_sq: f64,
    pub min_rotation_sq: f32,
}

impl MovementThresholds {
    /// Build from plain (unsquared) distances.
    pub fn from_distances(min_move: f64, min_rotation: f32) -> Self {
        Self {
            min_move_sq: min_move * min_move,
            min_rotation_sq: min_rotation * min_rotation,
        }
    }
}

impl Default for MovementThresholds {
    fn default() -> Self {
        Self::from_distances(1.0 / 16.0, 0.15)
    }
}

/// What the connection should do after a packet has been handled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    /// Neither flag was set.
    Ignored,
    /// Too small to fire an event; applied, baseline kept.
    Accepted,
    /// Event fired and went through; baseline moved.
    Moved(MoveKind),
    /// Cancelled by a listener or malformed. Send the client back to `resync`.
    Rejected { resync: Transform },
    /// A listener changed the destination. Tell the client about `resync`.
    Redirected { resync: Transform },
    /// A client echo that lost the race with a server teleport. Dropped.
    Superseded,
}

impl MoveOutcome {
    pub fn resync(&self) -> Option<Transform> {
        match self {
            MoveOutcome::Rejected { resync } | MoveOutcome::Redirected { resync } => Some(*resync),
            _ => None,
        }
    }
}

/// Movement state of one connection. Driven from the main thread only.
#[derive(Debug, Clone)]
pub struct MovementPipeline {
    transform: Transform,
    /// Position of the last significant move. Deltas are measured from here,
    /// never from the live position, so sub-threshold steps cannot add up
    /// unnoticed.
    last_move_location: DVec3,
    just_teleported: bool,
    velocity_override: Option<DVec3>,
    thresholds: MovementThresholds,
}

impl MovementPipeline {
    pub fn new(spawn: Transform, thresholds: MovementThresholds) -> Self {
        Self {
            transform: spawn,
            last_move_location: spawn.position,
            just_teleported: false,
            velocity_override: None,
            thresholds,
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn last_move_location(&self) -> DVec3 {
        self.last_move_location
    }

    pub fn just_teleported(&self) -> bool {
        self.just_teleported
    }

    pub fn velocity_override(&self) -> Option<DVec3> {
        self.velocity_override
    }

    pub fn thresholds(&self) -> MovementThresholds {
        self.thresholds
    }

    /// Server-initiated move. The next packet fires no event: it is dropped
    /// and the baseline rebased onto the teleport target.
    pub fn teleport(&mut self, to: Transform) {
        self.transform = to;
        self.just_teleported = true;
        self.velocity_override = None;
    }

    pub fn handle(&mut self, packet: &MovePacket, listener: &mut dyn MoveListener) -> MoveOutcome {
        if !packet.moving && !packet.rotating {
            return MoveOutcome::Ignored;
        }
        if !packet.is_finite() {
            tracing::warn!("Rejected non-finite move packet: {:?}", packet);
            return MoveOutcome::Rejected {
                resync: self.transform,
            };
        }

        if self.just_teleported {
            // One update cycle without events after a teleport.
            self.last_move_location = self.transform.position;
            self.settle();
            return MoveOutcome::Superseded;
        }

        let (from, to) = self.candidate(packet);
        self.velocity_override = Some(to.position - from.position);

        let Some(kind) = self.classify(&from, &to) else {
            self.velocity_override = None;
            self.transform = to;
            return MoveOutcome::Accepted;
        };

        let mut event = MoveEvent::new(kind, from, to);
        listener.on_move(&mut event);

        if event.is_cancelled() {
            // `from` already sits on the baseline (or is the live transform
            // for rotation-only packets), so the baseline stays put.
            self.transform = from;
            self.settle();
            return MoveOutcome::Rejected { resync: from };
        }
        if event.to() != to {
            let redirected = event.to();
            self.transform = redirected;
            self.last_move_location = redirected.position;
            self.settle();
            return MoveOutcome::Redirected { resync: redirected };
        }

        self.transform = to;
        // Only a significant position change moves the baseline.
        if kind == MoveKind::Position {
            self.last_move_location = to.position;
        }
        MoveOutcome::Moved(kind)
    }

    /// Build the from/to pair, filling in whatever the packet left out.
    fn candidate(&self, packet: &MovePacket) -> (Transform, Transform) {
        let live = self.transform;
        if !packet.moving {
            // Rotation only: the packet's position is zeroed by the client.
            let to = live.with_rotation(packet.yaw, packet.pitch);
            return (live, to);
        }

        let from = live.with_position(self.last_move_location);
        let target = DVec3::new(packet.x, packet.y, packet.z);
        let to = if packet.rotating {
            Transform::new(target, packet.yaw, packet.pitch)
        } else {
            // Position only: the packet's angles are stale.
            from.with_position(target)
        };
        (from, to)
    }

    fn classify(&self, from: &Transform, to: &Transform) -> Option<MoveKind> {
        if from.position.distance_squared(to.position) > self.thresholds.min_move_sq {
            return Some(MoveKind::Position);
        }
        let yaw = to.yaw - from.yaw;
        let pitch = to.pitch - from.pitch;
        if yaw * yaw + pitch * pitch > self.thresholds.min_rotation_sq {
            return Some(MoveKind::Rotation);
        }
        None
    }

    fn settle(&mut self) {
        self.velocity_override = None;
        self.just_teleported = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::Unobserved;

    fn pipeline() -> MovementPipeline {
        MovementPipeline::new(Transform::at(0.0, 64.0, 0.0), MovementThresholds::default())
    }

    #[test]
    fn packets_without_flags_are_ignored() {
        let mut p = pipeline();
        let outcome = p.handle(&MovePacket::default(), &mut Unobserved);
        assert_eq!(outcome, MoveOutcome::Ignored);
        assert_eq!(p.transform(), Transform::at(0.0, 64.0, 0.0));
    }

    #[test]
    fn position_only_keeps_rotation() {
        let mut p = MovementPipeline::new(
            Transform::new(DVec3::ZERO, 90.0, 10.0),
            MovementThresholds::default(),
        );
        let mut packet = MovePacket::position(1.0, 0.0, 0.0);
        packet.yaw = 0.0;
        assert_eq!(p.handle(&packet, &mut Unobserved), MoveOutcome::Moved(MoveKind::Position));
        assert_eq!(p.transform().yaw, 90.0);
        assert_eq!(p.transform().pitch, 10.0);
    }

    #[test]
    fn rotation_only_keeps_position() {
        let mut p = pipeline();
        let outcome = p.handle(&MovePacket::rotation(45.0, 0.0), &mut Unobserved);
        assert_eq!(outcome, MoveOutcome::Moved(MoveKind::Rotation));
        assert_eq!(p.transform().position, DVec3::new(0.0, 64.0, 0.0));
        assert_eq!(p.transform().yaw, 45.0);
    }

    #[test]
    fn combined_move_prefers_position_event() {
        let mut p = pipeline();
        let mut seen = Vec::new();
        let mut listener = |e: &mut MoveEvent| seen.push(e.kind());
        p.handle(&MovePacket::full(2.0, 64.0, 0.0, 30.0, 5.0), &mut listener);
        assert_eq!(seen, vec![MoveKind::Position]);
    }

    #[test]
    fn small_rotation_is_accepted_silently() {
        let mut p = pipeline();
        let outcome = p.handle(&MovePacket::rotation(0.1, 0.0), &mut Unobserved);
        assert_eq!(outcome, MoveOutcome::Accepted);
        assert_eq!(p.transform().yaw, 0.1);
    }

    #[test]
    fn non_finite_packet_is_rejected() {
        let mut p = pipeline();
        let outcome = p.handle(&MovePacket::position(f64::NAN, 0.0, 0.0), &mut Unobserved);
        assert_eq!(
            outcome,
            MoveOutcome::Rejected {
                resync: Transform::at(0.0, 64.0, 0.0)
            }
        );
        let outcome = p.handle(&MovePacket::rotation(f32::INFINITY, 0.0), &mut Unobserved);
        assert!(matches!(outcome, MoveOutcome::Rejected { .. }));
    }

    #[test]
    fn redirect_applies_listener_destination() {
        let mut p = pipeline();
        let detour = Transform::at(5.0, 70.0, 5.0);
        let mut listener = |e: &mut MoveEvent| e.set_to(detour);
        let outcome = p.handle(&MovePacket::position(1.0, 64.0, 0.0), &mut listener);
        assert_eq!(outcome, MoveOutcome::Redirected { resync: detour });
        assert_eq!(p.transform(), detour);
        assert_eq!(p.last_move_location(), detour.position);
        assert_eq!(p.velocity_override(), None);
    }

    #[test]
    fn stale_echo_after_teleport_is_superseded() {
        let mut p = pipeline();
        p.teleport(Transform::at(100.0, 64.0, 100.0));
        // The client has not seen the teleport yet and reports a step near spawn.
        let outcome = p.handle(&MovePacket::position(1.0, 64.0, 0.0), &mut Unobserved);
        assert_eq!(outcome, MoveOutcome::Superseded);
        assert_eq!(p.transform().position, DVec3::new(100.0, 64.0, 100.0));
        assert_eq!(p.last_move_location(), DVec3::new(100.0, 64.0, 100.0));
        assert!(!p.just_teleported());

        let outcome = p.handle(&MovePacket::position(101.0, 64.0, 100.0), &mut Unobserved);
        assert_eq!(outcome, MoveOutcome::Moved(MoveKind::Position));
    }

    #[test]
    fn echo_of_teleport_fires_no_event() {
        let mut p = pipeline();
        let target = Transform::at(100.0, 64.0, 100.0);
        let mut fired = 0;
        let mut deny = |e: &mut MoveEvent| {
            fired += 1;
            e.cancel();
        };
        p.teleport(target);
        let outcome = p.handle(&MovePacket::position(100.0, 64.0, 100.0), &mut deny);
        assert_eq!(outcome, MoveOutcome::Superseded);
        assert_eq!(fired, 0);
        assert_eq!(p.transform(), target);
        assert_eq!(p.last_move_location(), target.position);
    }

    #[test]
    fn rotation_event_keeps_position_baseline() {
        let mut p = pipeline();
        p.handle(&MovePacket::full(0.0, 64.0, 0.05, 30.0, 0.0), &mut Unobserved);
        assert_eq!(p.transform().position, DVec3::new(0.0, 64.0, 0.05));
        assert_eq!(p.last_move_location(), DVec3::new(0.0, 64.0, 0.0));
    }

    #[test]
    fn custom_thresholds() {
        let mut p = MovementPipeline::new(Transform::at(0.0, 0.0, 0.0), MovementThresholds::from_distances(2.0, 10.0));
        assert_eq!(p.handle(&MovePacket::position(1.5, 0.0, 0.0), &mut Unobserved), MoveOutcome::Accepted);
        assert_eq!(p.handle(&MovePacket::rotation(5.0, 0.0), &mut Unobserved), MoveOutcome::Accepted);
    }
}
