//! `tracker.toml`: every section and field is optional.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use tracker_engine::movement::MovementThresholds;
use tracker_engine::tracking::WorldRole;
use tracker_engine::tracking::resolver::{DEFAULT_INVALID_IDS, ResolverSettings};

#[derive(Debug, Default, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub world: WorldSection,
    #[serde(default)]
    pub tracking: TrackingSection,
    #[serde(default)]
    pub movement: MovementSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Player names allowed to override attribution.
    #[serde(default)]
    pub operators: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0:25565".into()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            operators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleSetting {
    Authoritative,
    Remote,
    Sandbox,
}

impl From<RoleSetting> for WorldRole {
    fn from(role: RoleSetting) -> Self {
        match role {
            RoleSetting::Authoritative => WorldRole::Authoritative,
            RoleSetting::Remote => WorldRole::Remote,
            RoleSetting::Sandbox => WorldRole::Sandbox,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WorldSection {
    #[serde(default = "default_world_directory")]
    pub directory: PathBuf,
    /// Auto-save interval in seconds. 0 = disabled.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,
    /// Horizontal distance from the origin players may not leave. 0 = no border.
    #[serde(default)]
    pub border_radius: f64,
    #[serde(default = "default_role")]
    pub role: RoleSetting,
}

fn default_world_directory() -> PathBuf {
    "world".into()
}

fn default_autosave_interval() -> u64 {
    300
}

fn default_role() -> RoleSetting {
    RoleSetting::Authoritative
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            directory: default_world_directory(),
            autosave_interval_secs: default_autosave_interval(),
            border_radius: 0.0,
            role: default_role(),
        }
    }
}

impl WorldSection {
    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_interval_secs > 0).then(|| Duration::from_secs(self.autosave_interval_secs))
    }
}

#[derive(Debug, Deserialize)]
pub struct TrackingSection {
    #[serde(default = "default_invalid_uuids")]
    pub invalid_uuids: Vec<Uuid>,
    #[serde(default = "default_profile_ttl")]
    pub profile_ttl_secs: u64,
    #[serde(default = "default_profile_directory")]
    pub profile_directory: PathBuf,
    #[serde(default = "default_usercache")]
    pub usercache: PathBuf,
}

fn default_invalid_uuids() -> Vec<Uuid> {
    DEFAULT_INVALID_IDS.to_vec()
}

fn default_profile_ttl() -> u64 {
    24 * 60 * 60
}

fn default_profile_directory() -> PathBuf {
    "profiles.json".into()
}

fn default_usercache() -> PathBuf {
    "usercache.json".into()
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            invalid_uuids: default_invalid_uuids(),
            profile_ttl_secs: default_profile_ttl(),
            profile_directory: default_profile_directory(),
            usercache: default_usercache(),
        }
    }
}

impl TrackingSection {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            invalid_ids: self.invalid_uuids.iter().copied().collect::<HashSet<_>>(),
            profile_ttl: Duration::from_secs(self.profile_ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MovementSection {
    #[serde(default = "default_min_move_distance")]
    pub min_move_distance: f64,
    #[serde(default = "default_min_rotation_delta")]
    pub min_rotation_delta: f32,
}

fn default_min_move_distance() -> f64 {
    1.0 / 16.0
}

fn default_min_rotation_delta() -> f32 {
    0.15
}

impl Default for MovementSection {
    fn default() -> Self {
        Self {
            min_move_distance: default_min_move_distance(),
            min_rotation_delta: default_min_rotation_delta(),
        }
    }
}

impl MovementSection {
    pub fn thresholds(&self) -> MovementThresholds {
        MovementThresholds::from_distances(self.min_move_distance, self.min_rotation_delta)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl TrackerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Like [`TrackerConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
