use super::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    /// The position changed (rotation may have too).
    Position,
    /// Only the facing changed.
    Rotation,
}

/// A significant move, offered to listeners before it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveEvent {
    kind: MoveKind,
    from: Transform,
    to: Transform,
    cancelled: bool,
}

impl MoveEvent {
    pub fn new(kind: MoveKind, from: Transform, to: Transform) -> Self {
        Self {
            kind,
            from,
            to,
            cancelled: false,
        }
    }

    pub fn kind(&self) -> MoveKind {
        self.kind
    }

    pub fn from(&self) -> Transform {
        self.from
    }

    pub fn to(&self) -> Transform {
        self.to
    }

    /// Redirect the move. The entity ends up exactly at `to`.
    pub fn set_to(&mut self, to: Transform) {
        self.to = to;
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

pub trait MoveListener {
    fn on_move(&mut self, event: &mut MoveEvent);
}

impl<F: FnMut(&mut MoveEvent)> MoveListener for F {
    fn on_move(&mut self, event: &mut MoveEvent) {
        self(event)
    }
}

/// A listener that lets every move through.
pub struct Unobserved;

impl MoveListener for Unobserved {
    fn on_move(&mut self, _event: &mut MoveEvent) {}
}
