// crates/toolgate-core/src/interfaces.rs
// ============================================================================
// Module: ToolGate Interfaces
// Description: Backend-agnostic interfaces for policy reads, caching, and events.
// Purpose: Define the contract surfaces the gateway runtime consumes.
// Dependencies: async-trait, serde, thiserror, tokio, crate::policy
// ============================================================================

//! ## Overview
//! Interfaces define how the gateway core integrates with external systems
//! without embedding backend-specific details. Implementations must be
//! deterministic for identical inputs and fail closed on missing or invalid
//! data: a store error during access resolution denies, it never grants.
//!
//! Security posture: every implementation sits on a trust boundary and
//! consumes untrusted input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::identifiers::GroupId;
use crate::policy::AccessPolicy;

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Policy store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum PolicyStoreError {
    /// The authoritative store could not be reached.
    #[error("policy store unreachable: {0}")]
    Unreachable(String),
    /// The store returned data that failed validation.
    #[error("policy store invalid data: {0}")]
    Invalid(String),
}

/// Authoritative read interface for access policies.
///
/// The gateway never mutates policies; administrative CRUD lives outside
/// the runtime and announces changes through the event bus.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Returns active policies ordered by ascending priority.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the store cannot serve a
    /// consistent snapshot; callers must treat this as deny.
    async fn active_policies(&self) -> Result<Vec<AccessPolicy>, PolicyStoreError>;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the store is unavailable.
    async fn readiness(&self) -> Result<(), PolicyStoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Shared Cache (L2)
// ============================================================================

/// Shared cache errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SharedCacheError {
    /// The cache backend reported an error.
    #[error("shared cache backend error: {0}")]
    Backend(String),
}

/// Cross-instance cache used as the L2 access tier.
///
/// Values are serialized JSON strings; keys are namespaced by prefix
/// (`acc:` for access entries). A backend error is treated as a cache
/// miss by callers, never as resolution data.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Returns the live value for a key.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] when the backend fails.
    async fn get(&self, key: &str) -> Result<Option<String>, SharedCacheError>;

    /// Stores a value that expires `ttl_ms` from now.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] when the backend fails.
    async fn set(&self, key: &str, value: String, ttl_ms: i64) -> Result<(), SharedCacheError>;

    /// Removes one key.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] when the backend fails.
    async fn remove(&self, key: &str) -> Result<(), SharedCacheError>;

    /// Removes every key under the given namespace prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] when the backend fails.
    async fn clear_prefix(&self, prefix: &str) -> Result<(), SharedCacheError>;
}

// ============================================================================
// SECTION: Invalidation Scope
// ============================================================================

/// Scope of an access or catalog invalidation.
///
/// # Invariants
/// - `Groups` carries the affected group set; `All` evicts everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "groups", rename_all = "snake_case")]
pub enum AccessScope {
    /// Every cached entry is affected.
    All,
    /// Only entries touching the listed groups are affected.
    Groups(BTreeSet<GroupId>),
}

impl AccessScope {
    /// Returns true when the scope covers the given group.
    #[must_use]
    pub fn covers(&self, group: &GroupId) -> bool {
        match self {
            Self::All => true,
            Self::Groups(groups) => groups.contains(group),
        }
    }

    /// Returns true when the scope intersects the given group set.
    #[must_use]
    pub fn intersects(&self, groups: &BTreeSet<GroupId>) -> bool {
        match self {
            Self::All => true,
            Self::Groups(affected) => affected.iter().any(|group| groups.contains(group)),
        }
    }
}

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Change notification delivered to every gateway instance.
///
/// # Invariants
/// - Events are idempotent: repeated delivery of the same event must not
///   change the outcome beyond the first application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Access policies changed for the given scope.
    PoliciesChanged {
        /// Affected invalidation scope.
        scope: AccessScope,
    },
    /// Tool-group definitions or memberships changed for the given scope.
    GroupsChanged {
        /// Affected invalidation scope.
        scope: AccessScope,
    },
}

impl GatewayEvent {
    /// Returns the invalidation scope carried by the event.
    #[must_use]
    pub const fn scope(&self) -> &AccessScope {
        match self {
            Self::PoliciesChanged {
                scope,
            }
            | Self::GroupsChanged {
                scope,
            } => scope,
        }
    }
}

/// Event bus errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BusError {
    /// Publishing failed because no subscriber channel is available.
    #[error("event bus publish failed: {0}")]
    Publish(String),
}

/// Shared pub/sub bus for cache invalidation and connection fan-out.
///
/// In-process deployments use a broadcast-channel implementation; clustered
/// deployments bridge an external bus into the same interface.
pub trait GatewayEventBus: Send + Sync {
    /// Publishes an event to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the event cannot be handed to the bus.
    fn publish(&self, event: GatewayEvent) -> Result<usize, BusError>;

    /// Opens a new subscription receiving all subsequently published events.
    fn subscribe(&self) -> broadcast::Receiver<GatewayEvent>;
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

    #[test]
    fn scope_covers_and_intersects() {
        let scope = AccessScope::Groups(BTreeSet::from([GroupId::new("finance")]));
        assert!(scope.covers(&GroupId::new("finance")));
        assert!(!scope.covers(&GroupId::new("hr")));
        let mixed = BTreeSet::from([GroupId::new("hr"), GroupId::new("finance")]);
        assert!(scope.intersects(&mixed));
        assert!(AccessScope::All.covers(&GroupId::new("anything")));
    }

    #[test]
    fn events_serialize_with_stable_tags() {
        let event = GatewayEvent::PoliciesChanged {
            scope: AccessScope::All,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"policies_changed\""));
        assert!(json.contains("\"scope\":\"all\""));
    }
}
