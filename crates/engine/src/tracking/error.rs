//! Integrity errors raised when rebuilding tracking data from storage.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("identity {id} appears twice in the identity table (indices {first} and {second})")]
    DuplicateIdentity { id: Uuid, first: usize, second: usize },

    #[error("{section} section has {keys} keys but {owners} owners and {notifiers} notifiers")]
    MismatchedArrays {
        section: &'static str,
        keys: usize,
        owners: usize,
        notifiers: usize,
    },

    #[error("key {key:#x} in the {section} section decodes to y={y}, outside that section's range")]
    KeyOutOfSection {
        section: &'static str,
        key: u32,
        y: i32,
    },

    #[error("key {key:#x} in the short section does not fit in 16 bits")]
    ShortKeyOverflow { key: i32 },
}
