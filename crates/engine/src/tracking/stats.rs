//! Lock-free attribution counters.
//!
//! Bumped from the main thread on every recording attempt; read by whoever
//! wants a status line.

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Instant;

use super::table::RecordOutcome;

pub struct TrackerStats {
    inserted: AtomicU64,
    updated: AtomicU64,
    unchanged: AtomicU64,
    /// Attempts skipped by a guard (role, phase, synthetic actor).
    suppressed: AtomicU64,
    purged: AtomicU64,
    started_at: Instant,
}

impl TrackerStats {
    pub fn new() -> Self {
        Self {
            inserted: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            purged: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record(&self, outcome: RecordOutcome) {
        let counter = match outcome {
            RecordOutcome::Inserted => &self.inserted,
            RecordOutcome::Updated => &self.updated,
            RecordOutcome::Unchanged => &self.unchanged,
        };
        counter.fetch_add(1, Relaxed);
    }

    pub fn suppressed(&self) {
        self.suppressed.fetch_add(1, Relaxed);
    }

    pub fn purged(&self) {
        self.purged.fetch_add(1, Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            inserted: self.inserted.load(Relaxed),
            updated: self.updated.load(Relaxed),
            unchanged: self.unchanged.load(Relaxed),
            suppressed: self.suppressed.load(Relaxed),
            purged: self.purged.load(Relaxed),
        }
    }
}

impl Default for TrackerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: f64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub suppressed: u64,
    pub purged: u64,
}

impl StatsSnapshot {
    /// Attempts that changed a tracker.
    pub fn writes(&self) -> u64 {
        self.inserted + self.updated
    }
}
