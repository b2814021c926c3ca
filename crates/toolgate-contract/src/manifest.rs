// crates/toolgate-contract/src/manifest.rs
// ============================================================================
// Module: Tool Manifests
// Description: Store-side tool records, group specs, and merged manifest entries.
// Purpose: Define the catalog data contract between store, resolver, and agents.
// Dependencies: serde, serde_json, toolgate-core
// ============================================================================

//! ## Overview
//! The tool store owns [`ToolRecord`]s and [`GroupSpec`]s; the catalog
//! resolver projects them into the [`ToolManifestEntry`] list an agent may
//! see. A tool belongs to a group iff it is enabled, matches at least one of
//! the group's selectors or is explicitly included, and is not explicitly
//! excluded. When the same tool is visible through several groups it is
//! merged into one entry whose owning group set accumulates.
//! Invariants:
//! - Explicit excludes always win over selectors and includes.
//! - Manifest entries never duplicate a tool id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use toolgate_core::GroupId;
use toolgate_core::SourceId;
use toolgate_core::ToolId;

use crate::profile::ExecutionProfile;

// ============================================================================
// SECTION: Store Records
// ============================================================================

/// One executable tool as owned by the authoritative tool store.
///
/// # Invariants
/// - `input_schema` is a JSON Schema payload validated at admission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Tool identifier, unique across the catalog.
    pub tool_id: ToolId,
    /// Upstream source the tool was cataloged from.
    pub source_id: SourceId,
    /// Human-readable tool name.
    pub name: String,
    /// Tool description shown to agents.
    pub description: String,
    /// JSON Schema for tool arguments.
    pub input_schema: Value,
    /// Declarative execution profile.
    pub profile: ExecutionProfile,
    /// Whether the tool may appear in any catalog.
    pub enabled: bool,
    /// Free-form tags consumed by group selectors.
    pub tags: BTreeSet<String>,
}

/// Selector matching tools into a group.
///
/// # Invariants
/// - An empty selector (no source, no tags) matches nothing; group
///   membership must always be stated explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSelector {
    /// Source the tool must originate from, when set.
    pub source_id: Option<SourceId>,
    /// Tags of which at least one must be present, when non-empty.
    pub tags: BTreeSet<String>,
}

impl ToolSelector {
    /// Returns true when the selector matches the record.
    #[must_use]
    pub fn matches(&self, record: &ToolRecord) -> bool {
        if self.source_id.is_none() && self.tags.is_empty() {
            return false;
        }
        if let Some(source_id) = &self.source_id
            && source_id != &record.source_id
        {
            return false;
        }
        if !self.tags.is_empty() && self.tags.is_disjoint(&record.tags) {
            return false;
        }
        true
    }
}

/// Group definition owned by the authoritative store.
///
/// # Invariants
/// - `exclude` wins over both `selectors` and `include`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Group identifier.
    pub group_id: GroupId,
    /// Selectors pulling tools into the group.
    pub selectors: Vec<ToolSelector>,
    /// Tools included regardless of selectors.
    pub include: BTreeSet<ToolId>,
    /// Tools excluded regardless of selectors and includes.
    pub exclude: BTreeSet<ToolId>,
}

impl GroupSpec {
    /// Returns true when the record belongs to this group.
    ///
    /// Disabled tools never belong; excludes beat selectors and includes.
    #[must_use]
    pub fn admits(&self, record: &ToolRecord) -> bool {
        if !record.enabled || self.exclude.contains(&record.tool_id) {
            return false;
        }
        self.include.contains(&record.tool_id)
            || self.selectors.iter().any(|selector| selector.matches(record))
    }
}

// ============================================================================
// SECTION: Manifest Entries
// ============================================================================

/// One tool as visible to agents, merged across owning groups.
///
/// # Invariants
/// - `group_ids` is non-empty and accumulates across groups; a tool id
///   appears at most once in any manifest list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifestEntry {
    /// Tool identifier.
    pub tool_id: ToolId,
    /// Upstream source identifier.
    pub source_id: SourceId,
    /// Human-readable tool name.
    pub name: String,
    /// Tool description shown to agents.
    pub description: String,
    /// JSON Schema for tool arguments.
    pub input_schema: Value,
    /// Declarative execution profile.
    pub profile: ExecutionProfile,
    /// Groups through which the tool is visible.
    pub group_ids: BTreeSet<GroupId>,
}

impl ToolManifestEntry {
    /// Projects a store record into a manifest entry owned by one group.
    #[must_use]
    pub fn from_record(record: &ToolRecord, group_id: GroupId) -> Self {
        Self {
            tool_id: record.tool_id.clone(),
            source_id: record.source_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            input_schema: record.input_schema.clone(),
            profile: record.profile.clone(),
            group_ids: BTreeSet::from([group_id]),
        }
    }

    /// Merges another sighting of the same tool into this entry.
    ///
    /// Only group ownership accumulates; the first-seen record fields win,
    /// which is safe because records are keyed by tool id in the store.
    pub fn absorb(&mut self, other: &Self) {
        self.group_ids.extend(other.group_ids.iter().cloned());
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

    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::profile::ExecutionMode;
    use crate::profile::HttpMethod;

    fn record(tool_id: &str, source_id: &str, tags: &[&str], enabled: bool) -> ToolRecord {
        ToolRecord {
            tool_id: ToolId::new(tool_id),
            source_id: SourceId::new(source_id),
            name: tool_id.to_string(),
            description: format!("{tool_id} tool"),
            input_schema: json!({"type": "object"}),
            profile: ExecutionProfile {
                mode: ExecutionMode::Sync,
                method: HttpMethod::Get,
                url_template: "https://api.example.com/x".to_string(),
                header_templates: BTreeMap::new(),
                body_template: None,
                variables: BTreeSet::new(),
                response_mapping: None,
                poll: None,
                timeout_ms: None,
                required_audience: "api".to_string(),
                required_scopes: Vec::new(),
            },
            enabled,
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn selector_requires_source_and_tag_constraints() {
        let selector = ToolSelector {
            source_id: Some(SourceId::new("billing-api")),
            tags: BTreeSet::from(["invoices".to_string()]),
        };
        assert!(selector.matches(&record("t1", "billing-api", &["invoices"], true)));
        assert!(!selector.matches(&record("t1", "hr-api", &["invoices"], true)));
        assert!(!selector.matches(&record("t1", "billing-api", &["payments"], true)));
    }

    #[test]
    fn empty_selector_matches_nothing() {
        let selector = ToolSelector {
            source_id: None,
            tags: BTreeSet::new(),
        };
        assert!(!selector.matches(&record("t1", "anything", &["any"], true)));
    }

    #[test]
    fn group_admission_honors_enable_include_exclude() {
        let group = GroupSpec {
            group_id: GroupId::new("finance"),
            selectors: vec![ToolSelector {
                source_id: None,
                tags: BTreeSet::from(["finance".to_string()]),
            }],
            include: BTreeSet::from([ToolId::new("special")]),
            exclude: BTreeSet::from([ToolId::new("blocked")]),
        };
        assert!(group.admits(&record("t1", "s", &["finance"], true)));
        assert!(!group.admits(&record("t1", "s", &["finance"], false)));
        assert!(group.admits(&record("special", "s", &[], true)));
        assert!(!group.admits(&record("blocked", "s", &["finance"], true)));
    }

    #[test]
    fn absorb_accumulates_group_ownership() {
        let base = record("t1", "s", &[], true);
        let mut entry = ToolManifestEntry::from_record(&base, GroupId::new("finance"));
        let other = ToolManifestEntry::from_record(&base, GroupId::new("audit"));
        entry.absorb(&other);
        assert_eq!(
            entry.group_ids,
            BTreeSet::from([GroupId::new("audit"), GroupId::new("finance")])
        );
    }
}
