//! Short-lived identity profile cache keyed by credential fingerprint.

use super::IdentityProfile;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a resolved profile is served before the provider is asked again.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Characters of the access token used as the cache key.
pub const FINGERPRINT_CHARS: usize = 20;

/// Truncated token prefix. Low collision risk within a session; not a
/// security boundary.
pub fn fingerprint(token: &str) -> String {
    token.chars().take(FINGERPRINT_CHARS).collect()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    profile: IdentityProfile,
    cached_at: Instant,
}

/// Entries older than the TTL read as absent but are only removed by the
/// sweep that runs on every `put`.
#[derive(Debug)]
pub struct IdentityCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached profile for `key`, unless it is at least `ttl` old. Expired
    /// entries are left in place.
    pub fn get(&self, key: &str) -> Option<IdentityProfile> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<IdentityProfile> {
        let entry = self.entries.get(key)?;
        if self.is_expired(entry, now) {
            return None;
        }
        Some(entry.profile.clone())
    }

    /// Store a profile and drop every entry that has expired.
    pub fn put(&mut self, key: impl Into<String>, profile: IdentityProfile) {
        self.put_at(key, profile, Instant::now());
    }

    pub fn put_at(&mut self, key: impl Into<String>, profile: IdentityProfile, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                profile,
                cached_at: now,
            },
        );
        self.sweep(now);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Physically stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.cached_at) < ttl);
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.cached_at) >= self.ttl
    }
}
