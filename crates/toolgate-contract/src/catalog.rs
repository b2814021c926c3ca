// crates/toolgate-contract/src/catalog.rs
// ============================================================================
// Module: Catalog Messages
// Description: Subscription-channel payloads for tool catalog delivery.
// Purpose: Define the initial snapshot and update pushes agents receive.
// Dependencies: serde, toolgate-contract::manifest
// ============================================================================

//! ## Overview
//! After authenticating, a subscribed agent receives one `snapshot` message
//! with its full visible tool list, then an `update` message with the
//! re-resolved list whenever a policy or group change affects it. Updates
//! carry the complete list rather than a diff so a missed message never
//! leaves an agent with a stale view after the next push.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::manifest::ToolManifestEntry;

// ============================================================================
// SECTION: Messages
// ============================================================================

/// One message on the catalog subscription channel.
///
/// # Invariants
/// - Tool lists are merged manifests: unique per tool id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogMessage {
    /// Initial full tool list delivered on subscription.
    Snapshot {
        /// Tools visible to the subscriber.
        tools: Vec<ToolManifestEntry>,
    },
    /// Re-resolved full tool list after an access or catalog change.
    Update {
        /// Tools visible to the subscriber after the change.
        tools: Vec<ToolManifestEntry>,
    },
}

impl CatalogMessage {
    /// Returns the carried tool list.
    #[must_use]
    pub fn tools(&self) -> &[ToolManifestEntry] {
        match self {
            Self::Snapshot {
                tools,
            }
            | Self::Update {
                tools,
            } => tools,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
