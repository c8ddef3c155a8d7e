//! Block ownership and notifier attribution.

pub mod error;
pub mod identity;
pub mod key;
pub mod phase;
pub mod resolver;
pub mod stats;
pub mod table;

use uuid::Uuid;

pub use error::TrackingError;
pub use identity::{IdentityIndex, NO_INDEX};
pub use key::BlockKey;
pub use phase::{Phase, PhaseTracker};
pub use resolver::{IdentityResolver, Resolution, TrackedUser};
pub use table::{AttributionKind, OwnershipTable, PlayerTracker, RecordOutcome};

/// Whoever is causing a block change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    /// A fake player: internal machinery acting under a player-shaped identity.
    pub synthetic: bool,
}

impl Actor {
    pub fn player(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            synthetic: false,
        }
    }

    pub fn synthetic(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            synthetic: true,
        }
    }
}

/// What kind of world a [`crate::world::World`] is. Only authoritative worlds
/// keep attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorldRole {
    #[default]
    Authoritative,
    /// A client-side mirror of somebody else's world.
    Remote,
    /// Throwaway simulation (previews, dry runs).
    Sandbox,
}

impl WorldRole {
    pub const fn tracks(self) -> bool {
        matches!(self, WorldRole::Authoritative)
    }
}
