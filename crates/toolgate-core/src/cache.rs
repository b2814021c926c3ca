// crates/toolgate-core/src/cache.rs
// ============================================================================
// Module: Cache Primitives
// Description: Process-local TTL cache and in-memory shared-cache backend.
// Purpose: Back the L1/identity/exchange/catalog tiers with bounded staleness.
// Dependencies: dashmap, async-trait, crate::interfaces, crate::time
// ============================================================================

//! ## Overview
//! [`TtlCache`] is the process-local cache primitive used for the L1 access
//! tier, the identity cache, the exchange cache, and per-group catalog
//! entries. Every entry carries its own absolute expiry computed from the
//! injected [`Clock`], so TTL behavior is deterministic under test.
//! [`InMemorySharedCache`] implements the L2 [`SharedCache`] interface for
//! single-node deployments and tests; multi-node deployments plug in an
//! external store behind the same trait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::interfaces::SharedCache;
use crate::interfaces::SharedCacheError;
use crate::time::Clock;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Process-Local TTL Cache
// ============================================================================

/// One cached value with its absolute expiry.
#[derive(Debug, Clone)]
struct Entry<V> {
    /// Cached value.
    value: V,
    /// Absolute expiry timestamp.
    expires_at: Timestamp,
}

/// Concurrent process-local cache with per-entry TTL.
///
/// # Invariants
/// - Expired entries are never returned; they are dropped on access.
/// - Operations lock at most one key at a time.
pub struct TtlCache<K, V> {
    /// Entries keyed by caller-provided keys.
    entries: DashMap<K, Entry<V>>,
    /// Time source for expiry decisions.
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty cache over the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Returns the live value for a key, dropping it when expired.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    /// Inserts a value that expires `ttl_ms` from now.
    ///
    /// Non-positive TTLs insert nothing; caching a value that is already
    /// stale would only mask the miss.
    pub fn insert(&self, key: K, value: V, ttl_ms: i64) {
        if ttl_ms <= 0 {
            return;
        }
        let expires_at = self.clock.now().plus_millis(ttl_ms);
        self.entries.insert(key, Entry {
            value,
            expires_at,
        });
    }

    /// Removes one key.
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Retains only entries whose key and value satisfy the predicate.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.entries.retain(|key, entry| keep(key, &entry.value));
    }

    /// Drops all expired entries.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Returns the number of entries, including not-yet-purged expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION: In-Memory Shared Cache
// ============================================================================

/// In-memory [`SharedCache`] backend for single-node deployments and tests.
///
/// # Invariants
/// - Honors the same TTL semantics the external L2 store would.
pub struct InMemorySharedCache {
    /// Serialized entries keyed by namespaced string keys.
    entries: TtlCache<String, String>,
}

impl InMemorySharedCache {
    /// Creates an empty shared cache over the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: TtlCache::new(clock),
        }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SharedCacheError> {
        Ok(self.entries.get(&key.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl_ms: i64) -> Result<(), SharedCacheError> {
        self.entries.insert(key.to_string(), value, ttl_ms);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SharedCacheError> {
        self.entries.remove(&key.to_string());
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), SharedCacheError> {
        let prefix = prefix.to_string();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;
    use crate::time::ManualClock;

    fn cache() -> (TtlCache<String, u64>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(0)));
        (TtlCache::new(clock.clone()), clock)
    }

    #[test]
    fn entries_expire_at_their_ttl() {
        let (cache, clock) = cache();
        cache.insert("k".to_string(), 7, 1_000);
        assert_eq!(cache.get(&"k".to_string()), Some(7));
        clock.advance_millis(999);
        assert_eq!(cache.get(&"k".to_string()), Some(7));
        clock.advance_millis(1);
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn non_positive_ttl_inserts_nothing() {
        let (cache, _clock) = cache();
        cache.insert("k".to_string(), 7, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn retain_filters_by_value() {
        let (cache, _clock) = cache();
        cache.insert("a".to_string(), 1, 60_000);
        cache.insert("b".to_string(), 2, 60_000);
        cache.retain(|_, value| *value != 1);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }

    #[tokio::test]
    async fn shared_cache_clears_by_prefix() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(0)));
        let cache = InMemorySharedCache::new(clock);
        cache.set("acc:1", "x".to_string(), 60_000).await.unwrap();
        cache.set("acc:2", "y".to_string(), 60_000).await.unwrap();
        cache.set("other:1", "z".to_string(), 60_000).await.unwrap();
        cache.clear_prefix("acc:").await.unwrap();
        assert_eq!(cache.get("acc:1").await.unwrap(), None);
        assert_eq!(cache.get("other:1").await.unwrap(), Some("z".to_string()));
    }
}
