// crates/toolgate-access/src/context.rs
// ============================================================================
// Module: Access Context
// Description: Resolution result for one identity.
// Purpose: Carry allowed groups, visible tools, and the serving cache tier.
// Dependencies: serde, toolgate-core, toolgate-contract
// ============================================================================

//! ## Overview
//! An [`AccessContext`] is the complete resolution result for one identity:
//! the allowed group-id set, the merged tool manifest visible through those
//! groups, and the cache tier that served the group set. The tier is
//! carried for observability only; it never influences authorization.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use toolgate_contract::ToolManifestEntry;
use toolgate_core::GroupId;
use toolgate_core::ToolId;

// ============================================================================
// SECTION: Cache Tier
// ============================================================================

/// Tier that served an access resolution.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Process-local cache.
    L1,
    /// Shared cross-instance cache.
    L2,
    /// Authoritative policy evaluation.
    L3,
}

impl CacheTier {
    /// Returns a stable label for the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
        }
    }
}

// ============================================================================
// SECTION: Access Context
// ============================================================================

/// Resolution result for one identity.
///
/// # Invariants
/// - `tools` contains only tools reachable through `group_ids`, merged and
///   unique per tool id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessContext {
    /// Groups the identity may use.
    pub group_ids: BTreeSet<GroupId>,
    /// Merged tool manifest visible through the groups.
    pub tools: Vec<ToolManifestEntry>,
    /// Tier that served the group set.
    pub tier: CacheTier,
}

impl AccessContext {
    /// Returns the manifest entry for a tool when the identity may see it.
    #[must_use]
    pub fn tool(&self, tool_id: &ToolId) -> Option<&ToolManifestEntry> {
        self.tools.iter().find(|entry| &entry.tool_id == tool_id)
    }

    /// Returns true when the identity may invoke the tool.
    #[must_use]
    pub fn allows(&self, tool_id: &ToolId) -> bool {
        self.tool(tool_id).is_some()
    }
}
