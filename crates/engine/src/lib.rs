//! Block attribution and movement causality for voxel worlds.
//!
//! - [`tracking`]: who owns and who last notified each block, stored per
//!   chunk as compact keys and dense identity indices.
//! - [`world`]: the per-world container tying chunk tables, the identity
//!   table and the resolver together.
//! - [`movement`]: per-connection move classification with cancellable
//!   events.

pub mod movement;
pub mod tracking;
pub mod world;
