//! `usercache.json`: last known name for every id the server has seen.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tracker_engine::tracking::IdentityResolver;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserCacheEntry {
    pub uuid: Uuid,
    pub name: String,
}

/// Seed the resolver's username cache. A missing file is not an error.
pub fn load(resolver: &IdentityResolver, path: &Path) -> Result<usize> {
    if !path.is_file() {
        return Ok(0);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries: Vec<UserCacheEntry> =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    let count = entries.len();
    for entry in entries {
        resolver.remember_name(entry.uuid, &entry.name);
    }
    Ok(count)
}

pub fn save(resolver: &IdentityResolver, path: &Path) -> Result<usize> {
    let mut entries: Vec<UserCacheEntry> = resolver
        .usernames()
        .into_iter()
        .map(|(uuid, name)| UserCacheEntry { uuid, name })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.uuid.cmp(&b.uuid)));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(entries.len())
}
