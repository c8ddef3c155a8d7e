//! Background profile resolution.
//!
//! The resolver hands unknown ids to a [`LookupQueueHandle`]; a tokio worker
//! drains the queue, asks the [`ProfileDirectory`] on the blocking pool and
//! reports back through [`IdentityResolver::finish_lookup`]. The main thread
//! never waits on any of it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use tracker_engine::tracking::IdentityResolver;
use tracker_engine::tracking::resolver::{
    GameProfile, LookupQueue, ProfileDirectory, ProfileProperty,
};

/// Sending side of the lookup queue, owned by the resolver.
pub struct LookupQueueHandle {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl LookupQueue for LookupQueueHandle {
    fn enqueue(&self, id: Uuid) -> bool {
        self.tx.send(id).is_ok()
    }
}

pub struct LookupReceiver {
    rx: mpsc::UnboundedReceiver<Uuid>,
}

/// Create the queue. The handle goes into the resolver, the receiver into
/// [`start`] once the resolver exists.
pub fn channel() -> (LookupQueueHandle, LookupReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LookupQueueHandle { tx }, LookupReceiver { rx })
}

/// Spawn the lookup worker on the current tokio runtime. It stops once the
/// resolver is dropped.
pub fn start(
    resolver: &Arc<IdentityResolver>,
    directory: Arc<dyn ProfileDirectory>,
    queue: LookupReceiver,
) -> JoinHandle<()> {
    let resolver: Weak<IdentityResolver> = Arc::downgrade(resolver);
    let mut rx = queue.rx;
    tokio::spawn(async move {
        while let Some(id) = rx.recv().await {
            let dir = Arc::clone(&directory);
            let profile = match tokio::task::spawn_blocking(move || dir.lookup(id)).await {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!("Profile lookup for {} panicked: {}", id, e);
                    None
                }
            };
            let Some(resolver) = resolver.upgrade() else {
                break;
            };
            resolver.finish_lookup(id, profile);
        }
        tracing::debug!("Profile lookup worker stopped");
    })
}

// ── File-backed directory ───────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct ProfileJson {
    id: Uuid,
    name: String,
    #[serde(default)]
    properties: Vec<PropertyJson>,
}

#[derive(Deserialize, Debug)]
struct PropertyJson {
    name: String,
    value: String,
    #[serde(default)]
    signature: Option<String>,
}

impl From<ProfileJson> for GameProfile {
    fn from(json: ProfileJson) -> Self {
        GameProfile {
            id: json.id,
            name: json.name,
            properties: json
                .properties
                .into_iter()
                .map(|p| ProfileProperty {
                    name: p.name,
                    value: p.value,
                    signature: p.signature,
                })
                .collect(),
        }
    }
}

/// A profile directory read from a JSON file (`[{id, name, properties}]`).
#[derive(Default)]
pub struct JsonDirectory {
    profiles: HashMap<Uuid, GameProfile>,
}

impl JsonDirectory {
    pub fn from_profiles(profiles: impl IntoIterator<Item = GameProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    /// Load `path`. A missing file gives an empty directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            tracing::info!("No profile directory at {}, lookups will miss", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let entries: Vec<ProfileJson> = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::from_profiles(entries.into_iter().map(GameProfile::from)))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileDirectory for JsonDirectory {
    fn lookup(&self, id: Uuid) -> Option<GameProfile> {
        self.profiles.get(&id).cloned()
    }
}
