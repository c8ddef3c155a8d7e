//! Compact chunk-local position keys.
//!
//! Layout (least-significant bit = bit 0):
//!
//! - short: bits 0..=3 x, bits 4..=11 y, bits 12..=15 z
//! - int:   bits 0..=3 x, bits 4..=27 y (two's complement), bits 28..=31 z
//!
//! Only the low four bits of x and z are stored. Callers translate world
//! coordinates to chunk-local ones (`BlockPos::local`) before encoding.

use crate::world::position::LocalBlockPos;

/// Heights below this (and >= 0) fit the short encoding.
pub const SHORT_Y_LIMIT: i32 = 256;

/// Lowest height the int encoding can hold.
pub const MIN_Y: i32 = -(1 << 23);
/// Highest height the int encoding can hold.
pub const MAX_Y: i32 = (1 << 23) - 1;

const XZ_MASK: i32 = 0xF;
const SHORT_Y_MASK: i32 = 0xFF;
const INT_Y_BITS: u32 = 24;
const INT_Y_MASK: u32 = (1 << INT_Y_BITS) - 1;
const INT_Z_SHIFT: u32 = 4 + INT_Y_BITS;

/// Packed chunk-local block key. Which variant a position gets is decided
/// solely by its y value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKey {
    Short(u16),
    Int(u32),
}

impl BlockKey {
    /// Whether `y` is stored with the short encoding.
    #[inline]
    pub const fn is_short_height(y: i32) -> bool {
        y >= 0 && y < SHORT_Y_LIMIT
    }

    /// Whether `y` survives encoding. Heights outside `MIN_Y..=MAX_Y` would
    /// alias another height in the int encoding.
    #[inline]
    pub const fn is_encodable_height(y: i32) -> bool {
        y >= MIN_Y && y <= MAX_Y
    }

    pub const fn encode(x: i32, y: i32, z: i32) -> Self {
        if Self::is_short_height(y) {
            BlockKey::Short(encode_short(x, y, z))
        } else {
            BlockKey::Int(encode_int(x, y, z))
        }
    }

    pub const fn for_local(pos: LocalBlockPos) -> Self {
        Self::encode(pos.x as i32, pos.y, pos.z as i32)
    }

    /// Unpack into `(x_local, y, z_local)`.
    pub const fn decode(self) -> (u8, i32, u8) {
        match self {
            BlockKey::Short(key) => decode_short(key),
            BlockKey::Int(key) => decode_int(key),
        }
    }

    pub const fn to_local(self) -> LocalBlockPos {
        let (x, y, z) = self.decode();
        LocalBlockPos { x, y, z }
    }
}

pub const fn encode_short(x: i32, y: i32, z: i32) -> u16 {
    ((x & XZ_MASK) | ((y & SHORT_Y_MASK) << 4) | ((z & XZ_MASK) << 12)) as u16
}

pub const fn decode_short(key: u16) -> (u8, i32, u8) {
    let key = key as i32;
    (
        (key & XZ_MASK) as u8,
        (key >> 4) & SHORT_Y_MASK,
        ((key >> 12) & XZ_MASK) as u8,
    )
}

pub const fn encode_int(x: i32, y: i32, z: i32) -> u32 {
    (x & XZ_MASK) as u32 | (((y as u32) & INT_Y_MASK) << 4) | (((z & XZ_MASK) as u32) << INT_Z_SHIFT)
}

pub const fn decode_int(key: u32) -> (u8, i32, u8) {
    let raw_y = (key >> 4) & INT_Y_MASK;
    // Sign-extend the 24-bit height.
    let y = ((raw_y << (32 - INT_Y_BITS)) as i32) >> (32 - INT_Y_BITS);
    (
        (key & XZ_MASK as u32) as u8,
        y,
        ((key >> INT_Z_SHIFT) & XZ_MASK as u32) as u8,
    )
}
