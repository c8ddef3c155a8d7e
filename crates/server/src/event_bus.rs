//! Movement event bus.
//!
//! Listeners see every significant move in registration order. The first
//! listener to cancel stops propagation; later listeners never see the event.

use tracker_engine::movement::{MoveEvent, MoveKind, MoveListener};

pub struct EventBus {
    listeners: Vec<Box<dyn MoveListener + Send>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn register(&mut self, listener: impl MoveListener + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveListener for EventBus {
    fn on_move(&mut self, event: &mut MoveEvent) {
        for listener in &mut self.listeners {
            listener.on_move(event);
            if event.is_cancelled() {
                break; // Stop propagation
            }
        }
    }
}

/// Square border centred on the origin. Moves that would end outside it are
/// cancelled, which sends the player back to where they came from.
#[derive(Debug, Clone, Copy)]
pub struct WorldBorder {
    radius: f64,
}

impl WorldBorder {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    pub fn contains(&self, x: f64, z: f64) -> bool {
        x.abs() <= self.radius && z.abs() <= self.radius
    }
}

impl MoveListener for WorldBorder {
    fn on_move(&mut self, event: &mut MoveEvent) {
        if event.kind() != MoveKind::Position {
            return;
        }
        let to = event.to().position;
        if !self.contains(to.x, to.z) {
            tracing::debug!("Move to ({:.1}, {:.1}) crosses the world border", to.x, to.z);
            event.cancel();
        }
    }
}
