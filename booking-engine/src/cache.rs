//! TTL-bounded read-through caches for profile and package lookups
//!
//! Entries expire passively: validity is checked on read and stale
//! entries are simply overwritten by the next successful fetch. There is
//! no background sweeping, so the maps grow with the number of distinct
//! keys seen over the process lifetime.

use crate::{
    clock::SharedClock,
    config::CacheConfig,
    models::{Package, Profile},
};
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::RwLock, time::Duration};
use tracing::debug;

/// A cached value and when it was fetched
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

/// Keyed cache with a fixed time-to-live
pub struct TtlCache<T> {
    name: &'static str,
    ttl: chrono::Duration,
    clock: SharedClock,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(name: &'static str, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            name,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the value for `key` if it was fetched less than one TTL ago
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;

        if self.clock.now() - entry.fetched_at < self.ttl {
            debug!(cache = self.name, key, "cache hit");
            Some(entry.value.clone())
        } else {
            debug!(cache = self.name, key, "cache entry expired");
            None
        }
    }

    /// Store a freshly fetched value
    pub fn insert(&self, key: impl Into<String>, value: T) {
        let entry = CacheEntry {
            value,
            fetched_at: self.clock.now(),
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), entry);
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two lookup caches shared by the engine
pub struct LookupCaches {
    pub profiles: TtlCache<Profile>,
    pub packages: TtlCache<Package>,
}

impl LookupCaches {
    pub fn new(config: &CacheConfig, clock: SharedClock) -> Self {
        Self {
            profiles: TtlCache::new("profiles", config.profile_ttl(), clock.clone()),
            packages: TtlCache::new("packages", config.package_ttl(), clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_entry_valid_strictly_before_ttl() {
        let clock = ManualClock::default();
        let cache: TtlCache<u32> =
            TtlCache::new("test", Duration::from_secs(300), Arc::new(clock.clone()));

        cache.insert("a", 1);
        clock.advance(chrono::Duration::seconds(299));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get("a"), None);
        // Passive expiry: the stale entry stays until overwritten
        assert_eq!(cache.len(), 1);

        cache.insert("a", 2);
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_lookup_caches_use_configured_ttls() {
        let clock = ManualClock::default();
        let caches = LookupCaches::new(&CacheConfig::default(), Arc::new(clock.clone()));

        caches.profiles.insert(
            "u1",
            Profile {
                user_id: "u1".into(),
                display_name: "Ada".into(),
                avatar_url: None,
            },
        );
        clock.advance(chrono::Duration::minutes(6));
        assert!(caches.profiles.get("u1").is_none());
        assert!(caches.packages.is_empty());
    }
}
