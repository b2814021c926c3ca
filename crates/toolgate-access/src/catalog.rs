// crates/toolgate-access/src/catalog.rs
// ============================================================================
// Module: Catalog Resolver
// Description: Per-group tool manifest resolution with merge-by-tool-id.
// Purpose: Expand allowed groups into the deduplicated visible tool list.
// Dependencies: async-trait, toolgate-contract, toolgate-core
// ============================================================================

//! ## Overview
//! The catalog resolver turns a group-id set into the merged tool manifest
//! an agent may see. Per-group manifests are cached with their own TTL; on
//! a miss the group is recomputed from the authoritative tool store using
//! the admission rule (enabled AND (selector match OR explicit include)
//! AND NOT excluded). Requested groups merge by tool id: a tool visible
//! through several groups yields one entry whose owning group set
//! accumulates.
//! Invariants:
//! - Unknown groups resolve to empty manifests, not errors.
//! - Store failures fail the whole resolution closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use toolgate_contract::GroupSpec;
use toolgate_contract::ToolManifestEntry;
use toolgate_contract::ToolRecord;
use toolgate_core::AccessScope;
use toolgate_core::Clock;
use toolgate_core::GroupId;
use toolgate_core::ToolId;
use toolgate_core::TtlCache;

// ============================================================================
// SECTION: Tool Store
// ============================================================================

/// Tool store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ToolStoreError {
    /// The authoritative store could not be reached.
    #[error("tool store unreachable: {0}")]
    Unreachable(String),
    /// The store returned data that failed validation.
    #[error("tool store invalid data: {0}")]
    Invalid(String),
}

/// Authoritative read interface for tools and group definitions.
#[async_trait]
pub trait ToolStore: Send + Sync {
    /// Returns the group definition when the group exists.
    ///
    /// # Errors
    ///
    /// Returns [`ToolStoreError`] when the store fails.
    async fn group_spec(&self, group_id: &GroupId) -> Result<Option<GroupSpec>, ToolStoreError>;

    /// Returns all enabled tool records.
    ///
    /// # Errors
    ///
    /// Returns [`ToolStoreError`] when the store fails.
    async fn enabled_tools(&self) -> Result<Vec<ToolRecord>, ToolStoreError>;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog resolution errors.
///
/// # Invariants
/// - Every variant is a deny for the requesting operation.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The authoritative tool store failed.
    #[error("catalog resolution failed closed: {0}")]
    Store(#[from] ToolStoreError),
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Per-group manifest resolver with TTL caching.
pub struct CatalogResolver {
    /// Authoritative tool store.
    store: Arc<dyn ToolStore>,
    /// Cached per-group manifests.
    cache: TtlCache<GroupId, Vec<ToolManifestEntry>>,
    /// Per-group cache TTL in milliseconds.
    ttl_ms: i64,
}

impl CatalogResolver {
    /// Creates a resolver with the given per-group TTL.
    #[must_use]
    pub fn new(store: Arc<dyn ToolStore>, ttl_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache: TtlCache::new(clock),
            ttl_ms: ttl_secs.saturating_mul(1_000),
        }
    }

    /// Resolves the merged tool manifest for a group set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the tool store fails; callers must
    /// treat this as deny.
    pub async fn resolve_tools(
        &self,
        group_ids: &BTreeSet<GroupId>,
    ) -> Result<Vec<ToolManifestEntry>, CatalogError> {
        let mut merged: BTreeMap<ToolId, ToolManifestEntry> = BTreeMap::new();
        for group_id in group_ids {
            let entries = self.group_manifest(group_id).await?;
            for entry in entries {
                match merged.get_mut(&entry.tool_id) {
                    Some(existing) => existing.absorb(&entry),
                    None => {
                        merged.insert(entry.tool_id.clone(), entry);
                    }
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Evicts cached group manifests covered by the scope.
    pub fn invalidate(&self, scope: &AccessScope) {
        match scope {
            AccessScope::All => self.cache.clear(),
            AccessScope::Groups(_) => {
                self.cache.retain(|group_id, _| !scope.covers(group_id));
            }
        }
    }

    /// Returns the number of cached group manifests, for diagnostics.
    #[must_use]
    pub fn cached_groups(&self) -> usize {
        self.cache.len()
    }

    /// Returns the manifest for one group, computing it on miss.
    async fn group_manifest(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<ToolManifestEntry>, CatalogError> {
        if let Some(entries) = self.cache.get(group_id) {
            return Ok(entries);
        }
        let entries = match self.store.group_spec(group_id).await? {
            Some(spec) => {
                let records = self.store.enabled_tools().await?;
                records
                    .iter()
                    .filter(|record| spec.admits(record))
                    .map(|record| ToolManifestEntry::from_record(record, group_id.clone()))
                    .collect()
            }
            None => {
                tracing::debug!(group = %group_id, "unknown group resolves to empty manifest");
                Vec::new()
            }
        };
        self.cache.insert(group_id.clone(), entries.clone(), self.ttl_ms);
        Ok(entries)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
