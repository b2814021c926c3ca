// crates/toolgate-access/src/resolver.rs
// ============================================================================
// Module: Access Resolver
// Description: Three-tier group-set resolution over the policy store.
// Purpose: Serve allowed group sets fast while staying invalidation-correct.
// Dependencies: serde_json, toolgate-core
// ============================================================================

//! ## Overview
//! Resolution walks three tiers: the process-local L1 cache (short TTL),
//! the shared L2 cache (longer TTL, visible to every gateway instance), and
//! authoritative L3 policy evaluation. An L3 evaluation populates both L1
//! and L2 before returning. The cache key derives from the access-relevant
//! claim subset only, so token churn does not fragment the cache.
//! Invariants:
//! - An unreachable policy store fails resolution; it never serves an empty
//!   grant as if it were authoritative.
//! - `invalidate` is the only mutation entrypoint besides TTL expiry and is
//!   idempotent under repeated delivery.
//! - L2 backend failures degrade to misses; they never abort resolution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use toolgate_core::AccessScope;
use toolgate_core::Clock;
use toolgate_core::GroupId;
use toolgate_core::HashError;
use toolgate_core::Identity;
use toolgate_core::PolicyStore;
use toolgate_core::PolicyStoreError;
use toolgate_core::SharedCache;
use toolgate_core::SharedCacheError;
use toolgate_core::TtlCache;
use toolgate_core::access_cache_key;
use toolgate_core::evaluate_policies;

use crate::context::CacheTier;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Access resolution errors.
///
/// # Invariants
/// - Every variant is a deny at the authorization boundary.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The authoritative policy store failed.
    #[error("access resolution failed closed: {0}")]
    Store(#[from] PolicyStoreError),
    /// Cache-key derivation failed.
    #[error("access cache key failure: {0}")]
    Key(#[from] HashError),
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Resolver TTL settings.
///
/// # Invariants
/// - L1 TTL is shorter than L2 TTL so local entries never outlive shared
///   ones.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Process-local tier TTL in seconds.
    pub l1_ttl_secs: i64,
    /// Shared tier TTL in seconds.
    pub l2_ttl_secs: i64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            l1_ttl_secs: 60,
            l2_ttl_secs: 300,
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Group set resolved for one identity, with its serving tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroups {
    /// Allowed group ids.
    pub group_ids: BTreeSet<GroupId>,
    /// Tier that served the set.
    pub tier: CacheTier,
}

/// Three-tier access resolver.
///
/// One instance exists per process, constructed at startup and shared by
/// reference; the L1 tier is deliberately process-scoped.
pub struct AccessResolver {
    /// TTL settings.
    config: ResolverConfig,
    /// Authoritative policy store.
    store: Arc<dyn PolicyStore>,
    /// Shared L2 cache.
    shared: Arc<dyn SharedCache>,
    /// Process-local L1 cache keyed by access-cache key.
    l1: TtlCache<String, BTreeSet<GroupId>>,
}

impl AccessResolver {
    /// Creates a resolver over the given store, shared cache, and clock.
    #[must_use]
    pub fn new(
        config: ResolverConfig,
        store: Arc<dyn PolicyStore>,
        shared: Arc<dyn SharedCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            shared,
            l1: TtlCache::new(clock),
        }
    }

    /// Resolves the allowed group set for an identity.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the authoritative store fails; callers
    /// must treat this as deny.
    pub async fn resolve(&self, identity: &Identity) -> Result<ResolvedGroups, AccessError> {
        let key = access_cache_key(&identity.access_key_material())?;

        if let Some(group_ids) = self.l1.get(&key) {
            return Ok(ResolvedGroups {
                group_ids,
                tier: CacheTier::L1,
            });
        }

        match self.shared.get(&key).await {
            Ok(Some(serialized)) => {
                if let Ok(group_ids) = serde_json::from_str::<BTreeSet<GroupId>>(&serialized) {
                    self.l1.insert(
                        key,
                        group_ids.clone(),
                        self.config.l1_ttl_secs.saturating_mul(1_000),
                    );
                    return Ok(ResolvedGroups {
                        group_ids,
                        tier: CacheTier::L2,
                    });
                }
                tracing::warn!("discarding undecodable shared-cache access entry");
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "shared cache read failed, treating as miss");
            }
        }

        let policies = self.store.active_policies().await?;
        let group_ids = evaluate_policies(&policies, &identity.claims);

        self.l1.insert(key.clone(), group_ids.clone(), self.config.l1_ttl_secs.saturating_mul(1_000));
        match serde_json::to_string(&group_ids) {
            Ok(serialized) => {
                if let Err(err) = self
                    .shared
                    .set(&key, serialized, self.config.l2_ttl_secs.saturating_mul(1_000))
                    .await
                {
                    tracing::warn!(error = %err, "shared cache write failed");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize access entry for shared cache");
            }
        }
        Ok(ResolvedGroups {
            group_ids,
            tier: CacheTier::L3,
        })
    }

    /// Evicts cached entries covered by the scope.
    ///
    /// The L1 tier evicts selectively by cached group membership; the L2
    /// tier clears the whole access namespace because its interface cannot
    /// map groups back to keys. Repeated delivery of the same scope is a
    /// no-op after the first application.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] when the shared tier could not be
    /// cleared; local eviction has already happened by then.
    pub async fn invalidate(&self, scope: &AccessScope) -> Result<(), SharedCacheError> {
        match scope {
            AccessScope::All => self.l1.clear(),
            AccessScope::Groups(_) => {
                self.l1.retain(|_, group_ids| !scope.intersects(group_ids));
            }
        }
        self.shared.clear_prefix("acc:").await
    }

    /// Returns the number of live L1 entries, for diagnostics.
    #[must_use]
    pub fn l1_entries(&self) -> usize {
        self.l1.len()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
