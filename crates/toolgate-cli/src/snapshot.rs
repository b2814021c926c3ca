// crates/toolgate-cli/src/snapshot.rs
// ============================================================================
// Module: Store Snapshots
// Description: JSON snapshot loading for static policy and catalog serving.
// Purpose: Back the in-memory stores from operator-provided files.
// Dependencies: serde, serde_json, toolgate-contract, toolgate-core
// ============================================================================

//! ## Overview
//! Static serving mode loads the policy and catalog snapshots from JSON
//! files at startup. Snapshots are validated on load: every execution
//! profile must be internally consistent, and duplicate tool ids are
//! rejected, so an invalid snapshot stops the gateway before it serves a
//! single request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use toolgate_contract::GroupSpec;
use toolgate_contract::ToolRecord;
use toolgate_core::AccessPolicy;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Snapshot loading errors.
///
/// # Invariants
/// - Variants are stable for operator-facing messages.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot file could not be read.
    #[error("snapshot io error: {0}")]
    Io(String),
    /// Snapshot failed to parse.
    #[error("snapshot parse error: {0}")]
    Parse(String),
    /// Snapshot content failed validation.
    #[error("snapshot invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Snapshot Shapes
// ============================================================================

/// Policy snapshot document.
#[derive(Debug, Deserialize)]
struct PolicySnapshot {
    /// Access policies ordered by priority.
    policies: Vec<AccessPolicy>,
}

/// Catalog snapshot document.
#[derive(Debug, Deserialize)]
pub struct CatalogSnapshot {
    /// Tool records.
    pub tools: Vec<ToolRecord>,
    /// Group definitions.
    pub groups: Vec<GroupSpec>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads and validates a policy snapshot.
///
/// # Errors
///
/// Returns [`SnapshotError`] when the file is unreadable or invalid.
pub fn load_policy_snapshot(path: impl AsRef<Path>) -> Result<Vec<AccessPolicy>, SnapshotError> {
    let text = fs::read_to_string(path).map_err(|err| SnapshotError::Io(err.to_string()))?;
    let snapshot: PolicySnapshot =
        serde_json::from_str(&text).map_err(|err| SnapshotError::Parse(err.to_string()))?;
    let mut seen = BTreeSet::new();
    for policy in &snapshot.policies {
        if !seen.insert(policy.policy_id.clone()) {
            return Err(SnapshotError::Invalid(format!(
                "duplicate policy id: {}",
                policy.policy_id
            )));
        }
    }
    Ok(snapshot.policies)
}

/// Loads and validates a catalog snapshot.
///
/// # Errors
///
/// Returns [`SnapshotError`] when the file is unreadable or invalid.
pub fn load_catalog_snapshot(path: impl AsRef<Path>) -> Result<CatalogSnapshot, SnapshotError> {
    let text = fs::read_to_string(path).map_err(|err| SnapshotError::Io(err.to_string()))?;
    let snapshot: CatalogSnapshot =
        serde_json::from_str(&text).map_err(|err| SnapshotError::Parse(err.to_string()))?;
    let mut seen = BTreeSet::new();
    for tool in &snapshot.tools {
        if !seen.insert(tool.tool_id.clone()) {
            return Err(SnapshotError::Invalid(format!("duplicate tool id: {}", tool.tool_id)));
        }
        tool.profile.validate().map_err(|err| {
            SnapshotError::Invalid(format!("tool {}: {err}", tool.tool_id))
        })?;
    }
    let mut group_ids = BTreeSet::new();
    for group in &snapshot.groups {
        if !group_ids.insert(group.group_id.clone()) {
            return Err(SnapshotError::Invalid(format!(
                "duplicate group id: {}",
                group.group_id
            )));
        }
    }
    Ok(snapshot)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
