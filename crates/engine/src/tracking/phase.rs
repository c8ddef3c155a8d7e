//! What the main thread is currently doing, as a stack of phases.
//!
//! Attribution is recorded only while the innermost phase allows it: block
//! changes made while generating terrain, loading chunks or restoring a
//! snapshot belong to nobody.

use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Tick,
    PlayerInteraction,
    PluginApi,
    WorldGeneration,
    ChunkLoad,
    Restore,
}

impl Phase {
    pub const fn tracks_attribution(self) -> bool {
        !matches!(
            self,
            Phase::WorldGeneration | Phase::ChunkLoad | Phase::Restore
        )
    }
}

/// Per-thread phase stack. Deliberately `!Sync`: it belongs to the thread
/// that drives the world.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    stack: RefCell<Vec<Phase>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `phase` until the returned guard is dropped.
    pub fn enter(&self, phase: Phase) -> PhaseGuard<'_> {
        let mut stack = self.stack.borrow_mut();
        let depth = stack.len();
        stack.push(phase);
        PhaseGuard {
            tracker: self,
            depth,
        }
    }

    pub fn current(&self) -> Phase {
        self.stack.borrow().last().copied().unwrap_or(Phase::Idle)
    }

    pub fn is_tracking(&self) -> bool {
        self.current().tracks_attribution()
    }

    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }
}

#[must_use = "the phase ends as soon as the guard is dropped"]
pub struct PhaseGuard<'a> {
    tracker: &'a PhaseTracker,
    /// Stack height before this phase was pushed.
    depth: usize,
}

impl Drop for PhaseGuard<'_> {
    /// Ends this phase and anything still nested inside it.
    fn drop(&mut self) {
        self.tracker.stack.borrow_mut().truncate(self.depth);
    }
}
