//! Tracking persistence using Minecraft's Anvil region file format (.mca).
//!
//! Chunk ownership tables live in `<world>/tracking/r.X.Z.mca`, one NBT
//! compound per chunk. The world's identity table lives in
//! `<world>/data/identities.dat` (gzipped NBT) and must be loaded first,
//! since chunk tables only store indices into it.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use fastnbt::IntArray;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tracker_engine::tracking::IdentityIndex;
use tracker_engine::tracking::table::{OwnershipTable, TrackerSection};
use tracker_engine::world::World;
use tracker_engine::world::position::ChunkPos;

/// DataVersion tag written into every saved chunk. MC 1.21.11 = 4189.
const DATA_VERSION: i32 = 4189;

const TRACKING_DIR: &str = "tracking";
const IDENTITY_FILE: &str = "data/identities.dat";

// ── NBT structs (serde) ─────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
struct ChunkNbt {
    #[serde(rename = "DataVersion")]
    data_version: i32,
    #[serde(rename = "xPos")]
    x_pos: i32,
    #[serde(rename = "zPos")]
    z_pos: i32,
    #[serde(rename = "Tracking", default)]
    tracking: TrackingNbt,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct TrackingNbt {
    #[serde(rename = "Short", default, skip_serializing_if = "Option::is_none")]
    short: Option<SectionNbt>,
    #[serde(rename = "Int", default, skip_serializing_if = "Option::is_none")]
    int: Option<SectionNbt>,
}

#[derive(Serialize, Deserialize, Debug)]
struct SectionNbt {
    #[serde(rename = "Keys")]
    keys: IntArray,
    #[serde(rename = "Owners")]
    owners: IntArray,
    #[serde(rename = "Notifiers")]
    notifiers: IntArray,
}

impl SectionNbt {
    fn from_section(section: TrackerSection) -> Option<Self> {
        if section.is_empty() {
            return None;
        }
        Some(Self {
            keys: IntArray::new(section.keys),
            owners: IntArray::new(section.owners),
            notifiers: IntArray::new(section.notifiers),
        })
    }

    fn to_section(&self) -> TrackerSection {
        TrackerSection {
            keys: self.keys.to_vec(),
            owners: self.owners.to_vec(),
            notifiers: self.notifiers.to_vec(),
        }
    }
}

fn section_or_empty(section: &Option<SectionNbt>) -> TrackerSection {
    section.as_ref().map(SectionNbt::to_section).unwrap_or_default()
}

#[derive(Serialize, Deserialize, Debug)]
struct IdentityFileNbt {
    #[serde(rename = "PlayerIdTable")]
    player_id_table: Vec<IdentityNbt>,
}

#[derive(Serialize, Deserialize, Debug)]
struct IdentityNbt {
    #[serde(rename = "UUIDMost")]
    most: i64,
    #[serde(rename = "UUIDLeast")]
    least: i64,
}

impl From<Uuid> for IdentityNbt {
    fn from(id: Uuid) -> Self {
        let (most, least) = id.as_u64_pair();
        Self {
            most: most as i64,
            least: least as i64,
        }
    }
}

impl From<&IdentityNbt> for Uuid {
    fn from(nbt: &IdentityNbt) -> Self {
        Uuid::from_u64_pair(nbt.most as u64, nbt.least as u64)
    }
}

// ── Save ────────────────────────────────────────────────────────────────────

/// Save the identity table and every dirty chunk table under `dir`.
///
/// Existing region files are opened and updated in-place; new region files
/// are created as needed. Returns the number of chunks written. On failure
/// the drained chunks are marked dirty again.
pub fn save_world(world: &World, dir: &Path) -> Result<usize> {
    save_identities(world, dir)?;

    let dirty = world.take_dirty_chunks();
    if dirty.is_empty() {
        tracing::debug!("Tracking save: no dirty chunks");
        return Ok(0);
    }

    match save_chunks(world, dir, &dirty) {
        Ok(n) => Ok(n),
        Err(e) => {
            world.mark_dirty(dirty);
            Err(e)
        }
    }
}

fn save_chunks(world: &World, dir: &Path, dirty: &[ChunkPos]) -> Result<usize> {
    let start = Instant::now();
    let region_dir = dir.join(TRACKING_DIR);
    fs::create_dir_all(&region_dir)
        .with_context(|| format!("creating {}", region_dir.display()))?;

    // Snapshot first so no DashMap shard is held while encoding.
    let tables: Vec<(ChunkPos, OwnershipTable)> = dirty
        .iter()
        .filter_map(|pos| world.table_snapshot(*pos).map(|table| (*pos, table)))
        .collect();

    let encoded: Vec<(ChunkPos, Vec<u8>)> = tables
        .into_par_iter()
        .map(|(pos, table)| {
            let nbt = chunk_to_nbt(pos, &table);
            fastnbt::to_bytes(&nbt)
                .with_context(|| format!("serializing chunk ({}, {})", pos.x, pos.z))
                .map(|bytes| (pos, bytes))
        })
        .collect::<Result<_>>()?;

    let mut region_chunks: HashMap<(i32, i32), Vec<(ChunkPos, Vec<u8>)>> = HashMap::new();
    for (pos, bytes) in encoded {
        let rx = pos.x.div_euclid(32);
        let rz = pos.z.div_euclid(32);
        region_chunks.entry((rx, rz)).or_default().push((pos, bytes));
    }

    let mut total_chunks = 0usize;

    for ((rx, rz), chunks) in &region_chunks {
        let path = region_dir.join(format!("r.{}.{}.mca", rx, rz));

        let mut region = if path.exists() {
            let file_bytes =
                fs::read(&path).with_context(|| format!("reading region r.{}.{}", rx, rz))?;
            fastanvil::Region::from_stream(Cursor::new(file_bytes))
                .with_context(|| format!("parsing region r.{}.{}", rx, rz))?
        } else {
            fastanvil::Region::new(Cursor::new(Vec::new()))
                .with_context(|| format!("creating region r.{}.{}", rx, rz))?
        };

        for (pos, nbt_bytes) in chunks {
            let local_x = pos.x.rem_euclid(32) as usize;
            let local_z = pos.z.rem_euclid(32) as usize;
            region
                .write_chunk(local_x, local_z, nbt_bytes)
                .with_context(|| format!("writing chunk ({}, {})", pos.x, pos.z))?;
            total_chunks += 1;
        }

        let mut cursor = region.into_inner()?;
        let len = cursor.stream_position()?;
        let data = cursor.into_inner();
        fs::write(&path, &data[..len as usize])
            .with_context(|| format!("writing {}", path.display()))?;
    }

    tracing::info!(
        "Tracking saved: {} chunks across {} regions ({:.2?})",
        total_chunks,
        region_chunks.len(),
        start.elapsed(),
    );
    Ok(total_chunks)
}

fn chunk_to_nbt(pos: ChunkPos, table: &OwnershipTable) -> ChunkNbt {
    ChunkNbt {
        data_version: DATA_VERSION,
        x_pos: pos.x,
        z_pos: pos.z,
        tracking: TrackingNbt {
            short: SectionNbt::from_section(table.short_entries()),
            int: SectionNbt::from_section(table.int_entries()),
        },
    }
}

/// Write the identity table. Index = position in the list.
pub fn save_identities(world: &World, dir: &Path) -> Result<()> {
    let ids = world.identity_snapshot();
    let path = dir.join(IDENTITY_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let nbt = IdentityFileNbt {
        player_id_table: ids.into_iter().map(IdentityNbt::from).collect(),
    };
    let bytes = fastnbt::to_bytes(&nbt).context("serializing identity table")?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&bytes)?;
    let compressed = encoder.finish().context("compressing identity table")?;
    fs::write(&path, compressed).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ── Load ────────────────────────────────────────────────────────────────────

/// Read the identity table, or `None` if the world has never been saved.
pub fn load_identities(dir: &Path) -> Result<Option<IdentityIndex>> {
    let path = dir.join(IDENTITY_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let compressed = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let mut bytes = Vec::new();
    GzDecoder::new(&compressed[..])
        .read_to_end(&mut bytes)
        .with_context(|| format!("decompressing {}", path.display()))?;
    let nbt: IdentityFileNbt =
        fastnbt::from_bytes(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    let index = IdentityIndex::from_ids(nbt.player_id_table.iter().map(Uuid::from))
        .with_context(|| format!("rebuilding identity table from {}", path.display()))?;
    Ok(Some(index))
}

/// Load saved tracking data into `world`: the identity table first, then
/// every chunk table under `<dir>/tracking/`. Must run on the world's
/// thread. Returns the number of chunk tables loaded.
pub fn load_into(world: &World, dir: &Path) -> Result<usize> {
    if let Some(identities) = load_identities(dir)? {
        let count = identities.len();
        if !world.load_identities(identities) {
            bail!("identity table must be loaded on the world's own thread");
        }
        tracing::info!("Loaded {} identities", count);
    }

    let region_dir = dir.join(TRACKING_DIR);
    if !region_dir.is_dir() {
        return Ok(0);
    }

    let start = Instant::now();
    let mut total_chunks = 0usize;
    let mut region_count = 0usize;

    for entry in fs::read_dir(&region_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".mca") {
            continue;
        }

        // r.X.Z.mca
        let parts: Vec<&str> = name.trim_end_matches(".mca").split('.').collect();
        if parts.len() != 3 || parts[0] != "r" {
            tracing::warn!("Skipping unexpected file in tracking dir: {}", name);
            continue;
        }

        let file = fs::File::open(&path)
            .with_context(|| format!("opening region file {}", path.display()))?;
        let mut region = fastanvil::Region::from_stream(file)
            .with_context(|| format!("parsing region file {}", path.display()))?;

        for x in 0..32usize {
            for z in 0..32usize {
                let Some(nbt_bytes) = region
                    .read_chunk(x, z)
                    .with_context(|| format!("reading chunk ({}, {}) from {}", x, z, name))?
                else {
                    continue;
                };

                let chunk_nbt: ChunkNbt = fastnbt::from_bytes(&nbt_bytes).with_context(|| {
                    format!("deserializing chunk ({}, {}) from {}", x, z, name)
                })?;

                let pos = ChunkPos::new(chunk_nbt.x_pos, chunk_nbt.z_pos);
                let short = section_or_empty(&chunk_nbt.tracking.short);
                let int = section_or_empty(&chunk_nbt.tracking.int);
                let table = match OwnershipTable::from_parts(&short, &int) {
                    Ok(table) => table,
                    Err(e) => {
                        tracing::warn!("Dropping tracking for chunk ({}, {}): {}", pos.x, pos.z, e);
                        continue;
                    }
                };

                if !world.insert_table(pos, table) {
                    bail!("chunk tables must be loaded on the world's own thread");
                }
                total_chunks += 1;
            }
        }
        region_count += 1;
    }

    tracing::info!(
        "Tracking loaded: {} chunks from {} regions ({:.2?})",
        total_chunks,
        region_count,
        start.elapsed(),
    );
    Ok(total_chunks)
}

// ── Tests ───────────────────────────────────────────────────────────────────
