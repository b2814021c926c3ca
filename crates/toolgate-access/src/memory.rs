// crates/toolgate-access/src/memory.rs
// ============================================================================
// Module: In-Memory Stores
// Description: Reference policy and tool stores for tests and static serving.
// Purpose: Back the resolver seams without an external store deployment.
// Dependencies: async-trait, tokio, toolgate-contract, toolgate-core
// ============================================================================

//! ## Overview
//! In-memory implementations of the authoritative store interfaces. They
//! serve two purposes: deterministic tests, and the static-snapshot serving
//! mode where policies and the tool catalog are loaded from files at
//! startup. Both honor the same fail-closed contract the real stores would,
//! including injectable read failures for tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use toolgate_contract::GroupSpec;
use toolgate_contract::ToolRecord;
use toolgate_core::AccessPolicy;
use toolgate_core::GroupId;
use toolgate_core::PolicyStore;
use toolgate_core::PolicyStoreError;

use crate::catalog::ToolStore;
use crate::catalog::ToolStoreError;

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// In-memory [`PolicyStore`] holding an immutable policy snapshot.
///
/// # Invariants
/// - Policies are sorted by ascending priority at construction.
pub struct InMemoryPolicyStore {
    /// Priority-ordered policy snapshot.
    policies: Vec<AccessPolicy>,
    /// Number of snapshot reads served.
    reads: AtomicUsize,
    /// When set, the next read fails as unreachable.
    fail_next: AtomicBool,
}

impl InMemoryPolicyStore {
    /// Creates a store from a policy snapshot.
    #[must_use]
    pub fn new(mut policies: Vec<AccessPolicy>) -> Self {
        policies.sort_by_key(|policy| policy.priority);
        Self {
            policies,
            reads: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Returns the number of snapshot reads served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Makes the next read fail as unreachable.
    pub fn fail_next_read(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn active_policies(&self) -> Result<Vec<AccessPolicy>, PolicyStoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PolicyStoreError::Unreachable("injected failure".to_string()));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.policies.iter().filter(|policy| policy.enabled).cloned().collect())
    }
}

// ============================================================================
// SECTION: Tool Store
// ============================================================================

/// In-memory [`ToolStore`] holding immutable tool and group snapshots.
pub struct InMemoryToolStore {
    /// Tool records, enabled and disabled.
    records: Vec<ToolRecord>,
    /// Group definitions.
    groups: Vec<GroupSpec>,
    /// Number of enabled-tool reads served.
    tool_reads: AtomicUsize,
    /// When set, the next read fails as unreachable.
    fail_next: AtomicBool,
}

impl InMemoryToolStore {
    /// Creates a store from tool and group snapshots.
    #[must_use]
    pub fn new(records: Vec<ToolRecord>, groups: Vec<GroupSpec>) -> Self {
        Self {
            records,
            groups,
            tool_reads: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Returns the number of enabled-tool reads served.
    #[must_use]
    pub fn tool_reads(&self) -> usize {
        self.tool_reads.load(Ordering::SeqCst)
    }

    /// Makes the next read fail as unreachable.
    pub fn fail_next_read(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ToolStore for InMemoryToolStore {
    async fn group_spec(&self, group_id: &GroupId) -> Result<Option<GroupSpec>, ToolStoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ToolStoreError::Unreachable("injected failure".to_string()));
        }
        Ok(self.groups.iter().find(|group| &group.group_id == group_id).cloned())
    }

    async fn enabled_tools(&self) -> Result<Vec<ToolRecord>, ToolStoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ToolStoreError::Unreachable("injected failure".to_string()));
        }
        self.tool_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.iter().filter(|record| record.enabled).cloned().collect())
    }
}
