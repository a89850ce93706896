use super::cache::{IdentityCache, fingerprint};
use super::provider::{CredentialHandle, IdentityProvider};
use super::IdentityProfile;
use crate::error::TelemetryError;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Turns a credential handle into an identity profile, going to the network
/// at most once per token fingerprint per TTL window.
///
/// Resolution never fails outward: any problem is logged at debug level and
/// reported as "no identity".
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    cache: Mutex<IdentityCache>,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::with_cache(provider, IdentityCache::new())
    }

    pub fn with_ttl(provider: Arc<dyn IdentityProvider>, ttl: Duration) -> Self {
        Self::with_cache(provider, IdentityCache::with_ttl(ttl))
    }

    fn with_cache(provider: Arc<dyn IdentityProvider>, cache: IdentityCache) -> Self {
        Self {
            provider,
            cache: Mutex::new(cache),
        }
    }

    pub fn resolve_email(&self, handle: &dyn CredentialHandle) -> Option<String> {
        self.resolve_email_at(handle, Instant::now())
    }

    /// A profile without a usable email resolves to `None`, same as a failed
    /// lookup.
    pub fn resolve_email_at(&self, handle: &dyn CredentialHandle, now: Instant) -> Option<String> {
        self.resolve_profile_at(handle, now)
            .and_then(|profile| profile.email)
            .filter(|email| !email.trim().is_empty())
    }

    pub fn resolve_profile(&self, handle: &dyn CredentialHandle) -> Option<IdentityProfile> {
        self.resolve_profile_at(handle, Instant::now())
    }

    pub fn resolve_profile_at(
        &self,
        handle: &dyn CredentialHandle,
        now: Instant,
    ) -> Option<IdentityProfile> {
        match self.try_resolve(handle, now) {
            Ok(profile) => profile,
            Err(err) => {
                tracing::debug!("failed to resolve identity for analytics: {}", err);
                None
            }
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn try_resolve(
        &self,
        handle: &dyn CredentialHandle,
        now: Instant,
    ) -> Result<Option<IdentityProfile>, TelemetryError> {
        let Some(token) = handle.access_token()?.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let key = fingerprint(&token);
        if let Some(profile) = self.cached(&key, now) {
            return Ok(Some(profile));
        }

        let profile = self.provider.fetch_profile(&token)?;

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| TelemetryError::Identity("identity cache lock poisoned".to_string()))?;
        cache.put_at(key, profile.clone(), now);

        Ok(Some(profile))
    }

    fn cached(&self, key: &str, now: Instant) -> Option<IdentityProfile> {
        self.cache.lock().ok()?.get_at(key, now)
    }
}
