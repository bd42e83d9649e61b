//! Local lease cache.
//!
//! Process-local view of the leases this server has been granted, keyed by
//! subject. Consulted on every data request so the hot path never touches
//! the lease table. Advisory only: the lease row in the store stays
//! authoritative.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use trove_core::Timestamp;

/// A cached grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLease {
    pub owner_id: String,
    pub expires_at: Timestamp,
}

/// Outcome of checking a claimed lease against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCheck {
    Missing,
    WrongOwner(CachedLease),
    /// The entry had expired and was evicted by this check.
    Expired(CachedLease),
    Valid(CachedLease),
}

/// Concurrent subject → lease map.
#[derive(Debug, Clone, Default)]
pub struct LeaseCache {
    entries: Arc<DashMap<String, CachedLease>>,
}

impl LeaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, subject_id: &str, lease: CachedLease) {
        self.entries.insert(subject_id.to_string(), lease);
    }

    pub fn remove(&self, subject_id: &str) -> Option<CachedLease> {
        self.entries.remove(subject_id).map(|(_, lease)| lease)
    }

    pub fn get(&self, subject_id: &str) -> Option<CachedLease> {
        self.entries.get(subject_id).map(|entry| entry.value().clone())
    }

    /// Check that `owner_id` holds a live lease on `subject_id`. Ownership
    /// is checked before expiry; an expired entry held by the caller is
    /// evicted.
    ///
    /// The check and the eviction happen under the entry's shard lock, so
    /// a concurrent `put` of a fresh grant is never evicted by mistake.
    pub fn check(&self, subject_id: &str, owner_id: &str, now: Timestamp) -> CacheCheck {
        match self.entries.entry(subject_id.to_string()) {
            Entry::Vacant(_) => CacheCheck::Missing,
            Entry::Occupied(entry) => {
                if entry.get().owner_id != owner_id {
                    CacheCheck::WrongOwner(entry.get().clone())
                } else if now > entry.get().expires_at {
                    CacheCheck::Expired(entry.remove())
                } else {
                    CacheCheck::Valid(entry.get().clone())
                }
            }
        }
    }

    /// Drop every entry that expired before `now`. Returns how many were
    /// dropped.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let mut dropped = 0;
        self.entries.retain(|_, lease| {
            let live = now <= lease.expires_at;
            if !live {
                dropped += 1;
            }
            live
        });
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.timestamp_millis_opt(1_704_067_200_000).unwrap()
    }

    fn lease(owner: &str, expires_in_ms: i64) -> CachedLease {
        CachedLease {
            owner_id: owner.to_string(),
            expires_at: t0() + Duration::milliseconds(expires_in_ms),
        }
    }

    #[test]
    fn test_check_valid_and_missing() {
        let cache = LeaseCache::new();
        assert_eq!(cache.check("u1", "s1", t0()), CacheCheck::Missing);

        cache.put("u1", lease("s1", 5_000));
        assert_eq!(cache.check("u1", "s1", t0()), CacheCheck::Valid(lease("s1", 5_000)));
        // Exactly at expiry is still live.
        let at_expiry = t0() + Duration::milliseconds(5_000);
        assert!(matches!(cache.check("u1", "s1", at_expiry), CacheCheck::Valid(_)));
    }

    #[test]
    fn test_check_evicts_expired() {
        let cache = LeaseCache::new();
        cache.put("u1", lease("s1", 5_000));
        let later = t0() + Duration::milliseconds(5_001);
        assert_eq!(cache.check("u1", "s1", later), CacheCheck::Expired(lease("s1", 5_000)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_wrong_owner_wins_over_expiry() {
        let cache = LeaseCache::new();
        cache.put("u1", lease("s1", 5_000));
        let later = t0() + Duration::milliseconds(9_000);
        assert!(matches!(cache.check("u1", "s2", later), CacheCheck::WrongOwner(_)));
        assert_eq!(cache.get("u1"), Some(lease("s1", 5_000)));
    }

    #[test]
    fn test_sweep_drops_only_expired() {
        let cache = LeaseCache::new();
        cache.put("u1", lease("s1", 1_000));
        cache.put("u2", lease("s1", 10_000));
        cache.put("u3", lease("s2", 2_000));

        let dropped = cache.sweep(t0() + Duration::milliseconds(5_000));
        assert_eq!(dropped, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("u2").is_some());
    }

    #[test]
    fn test_remove() {
        let cache = LeaseCache::new();
        cache.put("u1", lease("s1", 1_000));
        assert_eq!(cache.remove("u1"), Some(lease("s1", 1_000)));
        assert_eq!(cache.remove("u1"), None);
    }
}
