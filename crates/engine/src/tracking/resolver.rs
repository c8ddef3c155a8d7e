//! Layered resolution of dense indices back to user identities.
//!
//! Lookup order, first hit wins:
//!
//! 1. the world's [`IdentityIndex`] (index -> uuid)
//! 2. the configured invalid-id blacklist (reported as [`Resolution::Invalid`]
//!    so the caller can purge the stale tracker)
//! 3. the online player set
//! 4. the username cache
//! 5. the profile cache
//! 6. the background lookup queue (the call itself returns immediately)
//!
//! Caches are written by background lookup workers and read from the main
//! thread, so they live in `DashMap`s.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use uuid::{Uuid, uuid};

use super::identity::IdentityIndex;

/// Ids that broken mods and tools are known to attribute blocks to.
pub const DEFAULT_INVALID_IDS: [Uuid; 3] = [
    Uuid::nil(),
    uuid!("0ea8eca3-dbf6-47cc-9d1a-c64551ca975c"),
    uuid!("41c82c87-7afb-4024-ba57-13d2c99cae77"),
];

/// Default lifetime of a profile cache entry.
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

/// A directory-service profile: id, name and any extra signed properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProfile {
    pub id: Uuid,
    pub name: String,
    pub properties: Vec<ProfileProperty>,
}

/// Which layer produced a resolved user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOrigin {
    Online,
    UsernameCache,
    ProfileCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedUser {
    pub id: Uuid,
    pub name: String,
    pub origin: UserOrigin,
    pub properties: Vec<ProfileProperty>,
}

impl TrackedUser {
    pub fn online(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            origin: UserOrigin::Online,
            properties: Vec::new(),
        }
    }

    fn from_name(id: Uuid, name: String) -> Self {
        Self {
            id,
            name,
            origin: UserOrigin::UsernameCache,
            properties: Vec::new(),
        }
    }

    fn from_profile(profile: GameProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            origin: UserOrigin::ProfileCache,
            properties: profile.properties,
        }
    }
}

/// Outcome of a single resolution attempt. Absence is never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(TrackedUser),
    /// The index does not map to any id.
    Unknown,
    /// Nothing cached; a background lookup has been requested.
    Pending(Uuid),
    /// The id is blacklisted. Whoever holds a reference to it should drop it.
    Invalid(Uuid),
}

impl Resolution {
    pub fn user(self) -> Option<TrackedUser> {
        match self {
            Resolution::Found(user) => Some(user),
            _ => None,
        }
    }
}

/// Live view of connected players.
pub trait OnlineUsers: Send + Sync {
    fn online_user(&self, id: &Uuid) -> Option<TrackedUser>;
}

/// Remote (possibly slow) profile directory. Never called from the main thread.
pub trait ProfileDirectory: Send + Sync {
    fn lookup(&self, id: Uuid) -> Option<GameProfile>;
}

/// Fire-and-forget hand-off to whatever performs directory lookups.
pub trait LookupQueue: Send + Sync {
    /// Returns `false` if the queue is no longer accepting work.
    fn enqueue(&self, id: Uuid) -> bool;
}

/// An [`OnlineUsers`] with nobody connected (sandboxes, tools, tests).
pub struct NobodyOnline;

impl OnlineUsers for NobodyOnline {
    fn online_user(&self, _id: &Uuid) -> Option<TrackedUser> {
        None
    }
}

/// A [`LookupQueue`] that drops every request.
pub struct DetachedQueue;

impl LookupQueue for DetachedQueue {
    fn enqueue(&self, _id: Uuid) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub invalid_ids: HashSet<Uuid>,
    pub profile_ttl: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            invalid_ids: DEFAULT_INVALID_IDS.into_iter().collect(),
            profile_ttl: DEFAULT_PROFILE_TTL,
        }
    }
}

struct CachedProfile {
    profile: GameProfile,
    expires_at: Instant,
}

pub struct IdentityResolver {
    online: Arc<dyn OnlineUsers>,
    queue: Box<dyn LookupQueue>,
    invalid_ids: HashSet<Uuid>,
    profile_ttl: Duration,
    usernames: DashMap<Uuid, String>,
    profiles: DashMap<Uuid, CachedProfile>,
    pending: DashSet<Uuid>,
}

impl IdentityResolver {
    pub fn new(
        online: Arc<dyn OnlineUsers>,
        queue: Box<dyn LookupQueue>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            online,
            queue,
            invalid_ids: settings.invalid_ids,
            profile_ttl: settings.profile_ttl,
            usernames: DashMap::new(),
            profiles: DashMap::new(),
            pending: DashSet::new(),
        }
    }

    /// A resolver with no online players and no background lookups.
    pub fn detached(settings: ResolverSettings) -> Self {
        Self::new(Arc::new(NobodyOnline), Box::new(DetachedQueue), settings)
    }

    pub fn resolve(&self, index: i32, identities: &IdentityIndex) -> Resolution {
        match identities.id_for(index) {
            Some(id) => self.resolve_id(id),
            None => Resolution::Unknown,
        }
    }

    pub fn resolve_id(&self, id: Uuid) -> Resolution {
        if self.invalid_ids.contains(&id) {
            return Resolution::Invalid(id);
        }
        if let Some(user) = self.online.online_user(&id) {
            return Resolution::Found(user);
        }
        if let Some(name) = self.usernames.get(&id) {
            return Resolution::Found(TrackedUser::from_name(id, name.clone()));
        }
        if let Some(profile) = self.cached_profile(&id) {
            return Resolution::Found(TrackedUser::from_profile(profile));
        }
        self.request_lookup(id);
        Resolution::Pending(id)
    }

    pub fn is_invalid(&self, id: &Uuid) -> bool {
        self.invalid_ids.contains(id)
    }

    /// Record the latest known name for `id`.
    pub fn remember_name(&self, id: Uuid, name: &str) {
        if name.is_empty() || self.invalid_ids.contains(&id) {
            return;
        }
        self.usernames.insert(id, name.to_owned());
    }

    pub fn cache_profile(&self, profile: GameProfile) {
        let expires_at = Instant::now() + self.profile_ttl;
        self.profiles
            .insert(profile.id, CachedProfile { profile, expires_at });
    }

    /// Called by lookup workers once a queued request completes.
    pub fn finish_lookup(&self, id: Uuid, profile: Option<GameProfile>) {
        self.pending.remove(&id);
        match profile {
            Some(profile) => self.cache_profile(profile),
            None => tracing::debug!("Profile lookup for {} found nothing", id),
        }
    }

    pub fn pending_lookups(&self) -> usize {
        self.pending.len()
    }

    /// Snapshot of the username cache, for persisting it.
    pub fn usernames(&self) -> Vec<(Uuid, String)> {
        self.usernames
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    fn cached_profile(&self, id: &Uuid) -> Option<GameProfile> {
        {
            let entry = self.profiles.get(id)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.profile.clone());
            }
        }
        // A worker may have refreshed the entry since the guard was released.
        self.profiles
            .remove_if(id, |_, entry| entry.expires_at <= Instant::now());
        None
    }

    fn request_lookup(&self, id: Uuid) {
        if !self.pending.insert(id) {
            return;
        }
        if !self.queue.enqueue(id) {
            self.pending.remove(&id);
        }
    }
}
