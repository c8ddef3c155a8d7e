/// Absolute block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk this block belongs to.
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }

    /// Position within the chunk (0..16 on x/z, y untouched).
    pub const fn local(&self) -> LocalBlockPos {
        LocalBlockPos {
            x: (self.x & 0xF) as u8,
            y: self.y,
            z: (self.z & 0xF) as u8,
        }
    }

    /// The cardinal neighbors. Any that would overflow `i32` are skipped.
    pub fn neighbors(&self) -> impl Iterator<Item = BlockPos> {
        let BlockPos { x, y, z } = *self;
        [
            x.checked_add(1).map(|x| Self::new(x, y, z)),
            x.checked_sub(1).map(|x| Self::new(x, y, z)),
            y.checked_add(1).map(|y| Self::new(x, y, z)),
            y.checked_sub(1).map(|y| Self::new(x, y, z)),
            z.checked_add(1).map(|z| Self::new(x, y, z)),
            z.checked_sub(1).map(|z| Self::new(x, y, z)),
        ]
        .into_iter()
        .flatten()
    }
}

/// Chunk column position (each chunk is 16x16 blocks horizontally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Translate a chunk-local position back to world coordinates.
    pub const fn block_at(&self, local: LocalBlockPos) -> BlockPos {
        BlockPos::new(
            (self.x << 4) | local.x as i32,
            local.y,
            (self.z << 4) | local.z as i32,
        )
    }
}

/// Block position local to a chunk (x, z in 0..16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalBlockPos {
    pub x: u8,
    pub y: i32,
    pub z: u8,
}

impl LocalBlockPos {
    pub const fn new(x: u8, y: i32, z: u8) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_map_into_their_chunk() {
        let pos = BlockPos::new(-1, 70, -17);
        assert_eq!(pos.chunk(), ChunkPos::new(-1, -2));
        assert_eq!(pos.local(), LocalBlockPos::new(15, 70, 15));
    }

    #[test]
    fn local_translation_roundtrips() {
        for pos in [
            BlockPos::new(0, 0, 0),
            BlockPos::new(31, 300, -5),
            BlockPos::new(-100, -64, 1000),
        ] {
            assert_eq!(pos.chunk().block_at(pos.local()), pos);
        }
    }

    #[test]
    fn neighbors_are_adjacent() {
        let pos = BlockPos::new(4, 10, 4);
        for n in pos.neighbors() {
            let d = (n.x - pos.x).abs() + (n.y - pos.y).abs() + (n.z - pos.z).abs();
            assert_eq!(d, 1);
        }
    }

    #[test]
    fn neighbors_at_the_edge_of_i32_are_skipped() {
        assert_eq!(BlockPos::new(4, 10, 4).neighbors().count(), 6);
        let corner = BlockPos::new(i32::MAX, i32::MIN, 0);
        let found: Vec<_> = corner.neighbors().collect();
        assert_eq!(found.len(), 4);
        assert!(found.contains(&BlockPos::new(i32::MAX - 1, i32::MIN, 0)));
        assert!(found.contains(&BlockPos::new(i32::MAX, i32::MIN + 1, 0)));
    }
}
