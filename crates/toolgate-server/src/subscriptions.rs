// crates/toolgate-server/src/subscriptions.rs
// ============================================================================
// Module: Connection Fan-out
// Description: Live subscription registry with heartbeat TTL and group index.
// Purpose: Track agent connections and push catalog updates to them.
// Dependencies: dashmap, tokio, toolgate-contract, toolgate-core
// ============================================================================

//! ## Overview
//! Each subscribed agent connection is registered with its identity, its
//! currently allowed group ids, and a bounded push channel. A reverse index
//! by group id makes "which connections does this change affect" a set
//! lookup instead of a scan. Registrations expire unless refreshed by
//! heartbeats; unregistration removes the connection entry and every
//! reverse-index entry it owned.
//! Invariants:
//! - No lock spans more than one connection or group key.
//! - A slow consumer loses pushes, never blocks the fan-out path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use toolgate_contract::CatalogMessage;
use toolgate_core::AccessScope;
use toolgate_core::Clock;
use toolgate_core::ConnectionId;
use toolgate_core::GroupId;
use toolgate_core::Identity;
use toolgate_core::Timestamp;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Subscription registry settings.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionConfig {
    /// Registration TTL refreshed by heartbeats, in seconds.
    pub ttl_secs: i64,
    /// Per-connection push buffer size.
    pub push_buffer: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            push_buffer: 64,
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// One live subscription.
///
/// # Invariants
/// - `group_ids` mirrors the reverse index entries for this connection.
struct Subscription {
    /// Identity the subscription resolves for.
    identity: Identity,
    /// Groups the connection currently sees.
    group_ids: BTreeSet<GroupId>,
    /// Push channel to the connection handler.
    sender: mpsc::Sender<CatalogMessage>,
    /// Absolute registration expiry.
    expires_at: Timestamp,
}

/// Live subscription registry with a per-group reverse index.
pub struct SubscriptionRegistry {
    /// Subscriptions keyed by connection id.
    connections: DashMap<ConnectionId, Subscription>,
    /// Reverse index from group id to subscribed connections.
    by_group: DashMap<GroupId, BTreeSet<ConnectionId>>,
    /// Registry settings.
    config: SubscriptionConfig,
    /// Time source for TTL decisions.
    clock: Arc<dyn Clock>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: SubscriptionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            connections: DashMap::new(),
            by_group: DashMap::new(),
            config,
            clock,
        }
    }

    /// Registers a connection and returns its push receiver.
    ///
    /// Re-registering an existing connection id replaces the previous
    /// registration and its index entries.
    #[must_use]
    pub fn register(
        &self,
        connection_id: &ConnectionId,
        identity: Identity,
        group_ids: BTreeSet<GroupId>,
    ) -> mpsc::Receiver<CatalogMessage> {
        self.unregister(connection_id);
        let (sender, receiver) = mpsc::channel(self.config.push_buffer.max(1));
        let expires_at = self.clock.now().plus_secs(self.config.ttl_secs);
        for group_id in &group_ids {
            self.by_group
                .entry(group_id.clone())
                .or_default()
                .insert(connection_id.clone());
        }
        self.connections.insert(connection_id.clone(), Subscription {
            identity,
            group_ids,
            sender,
            expires_at,
        });
        receiver
    }

    /// Refreshes a registration TTL; returns false for unknown connections.
    pub fn heartbeat(&self, connection_id: &ConnectionId) -> bool {
        let expires_at = self.clock.now().plus_secs(self.config.ttl_secs);
        match self.connections.get_mut(connection_id) {
            Some(mut subscription) => {
                subscription.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Removes a connection and all of its index entries.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        if let Some((_, subscription)) = self.connections.remove(connection_id) {
            self.remove_index_entries(connection_id, &subscription.group_ids);
        }
    }

    /// Returns the identity registered for a connection.
    #[must_use]
    pub fn identity(&self, connection_id: &ConnectionId) -> Option<Identity> {
        self.connections.get(connection_id).map(|subscription| subscription.identity.clone())
    }

    /// Replaces a connection's group set, re-indexing it.
    pub fn update_groups(&self, connection_id: &ConnectionId, group_ids: BTreeSet<GroupId>) {
        let Some(mut subscription) = self.connections.get_mut(connection_id) else {
            return;
        };
        let previous = std::mem::take(&mut subscription.group_ids);
        subscription.group_ids = group_ids.clone();
        drop(subscription);
        self.remove_index_entries(connection_id, &previous);
        for group_id in &group_ids {
            self.by_group
                .entry(group_id.clone())
                .or_default()
                .insert(connection_id.clone());
        }
    }

    /// Returns connections affected by an invalidation scope.
    #[must_use]
    pub fn affected(&self, scope: &AccessScope) -> Vec<ConnectionId> {
        match scope {
            AccessScope::All => {
                self.connections.iter().map(|entry| entry.key().clone()).collect()
            }
            AccessScope::Groups(groups) => {
                let mut affected = BTreeSet::new();
                for group_id in groups {
                    if let Some(connections) = self.by_group.get(group_id) {
                        affected.extend(connections.iter().cloned());
                    }
                }
                affected.into_iter().collect()
            }
        }
    }

    /// Pushes a catalog message to one connection.
    ///
    /// A full buffer drops the message (the next update supersedes it); a
    /// closed channel unregisters the connection.
    pub fn push(&self, connection_id: &ConnectionId, message: CatalogMessage) {
        let sender = match self.connections.get(connection_id) {
            Some(subscription) => subscription.sender.clone(),
            None => return,
        };
        match sender.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection = %connection_id, "push buffer full, dropping update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unregister(connection_id);
            }
        }
    }

    /// Removes expired registrations and returns how many were swept.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();
        for connection_id in &expired {
            self.unregister(connection_id);
        }
        expired.len()
    }

    /// Returns the number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true when no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drops reverse-index entries for a connection.
    fn remove_index_entries(&self, connection_id: &ConnectionId, group_ids: &BTreeSet<GroupId>) {
        for group_id in group_ids {
            if let Some(mut connections) = self.by_group.get_mut(group_id) {
                connections.remove(connection_id);
                let empty = connections.is_empty();
                drop(connections);
                if empty {
                    self.by_group.remove_if(group_id, |_, connections| connections.is_empty());
                }
            }
        }
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

    use serde_json::json;
    use toolgate_core::ManualClock;

    use super::*;

    fn identity(subject: &str) -> Identity {
        Identity::new(
            subject,
            None,
            vec!["finance_user".to_string()],
            json!({"sub": subject}),
            Timestamp::from_unix_secs(1_000_000),
        )
    }

    fn groups(names: &[&str]) -> BTreeSet<GroupId> {
        names.iter().map(|name| GroupId::new(*name)).collect()
    }

    fn registry() -> (SubscriptionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(0)));
        (SubscriptionRegistry::new(SubscriptionConfig::default(), clock.clone()), clock)
    }

    #[tokio::test]
    async fn register_push_and_receive() {
        let (registry, _clock) = registry();
        let connection = ConnectionId::new("c1");
        let mut receiver = registry.register(&connection, identity("alice"), groups(&["finance"]));
        registry.push(&connection, CatalogMessage::Snapshot {
            tools: Vec::new(),
        });
        let message = receiver.recv().await.unwrap();
        assert!(matches!(message, CatalogMessage::Snapshot { .. }));
    }

    #[test]
    fn affected_uses_the_group_index() {
        let (registry, _clock) = registry();
        let finance = ConnectionId::new("finance-conn");
        let hr = ConnectionId::new("hr-conn");
        let _finance_rx = registry.register(&finance, identity("alice"), groups(&["finance"]));
        let _hr_rx = registry.register(&hr, identity("bob"), groups(&["hr"]));
        let affected =
            registry.affected(&AccessScope::Groups(groups(&["finance"])));
        assert_eq!(affected, vec![finance.clone()]);
        let all = registry.affected(&AccessScope::All);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn unregister_removes_both_indexes() {
        let (registry, _clock) = registry();
        let connection = ConnectionId::new("c1");
        let _rx = registry.register(&connection, identity("alice"), groups(&["finance"]));
        registry.unregister(&connection);
        assert!(registry.is_empty());
        assert!(registry.affected(&AccessScope::Groups(groups(&["finance"]))).is_empty());
    }

    #[test]
    fn update_groups_reindexes_the_connection() {
        let (registry, _clock) = registry();
        let connection = ConnectionId::new("c1");
        let _rx = registry.register(&connection, identity("alice"), groups(&["finance"]));
        registry.update_groups(&connection, groups(&["hr"]));
        assert!(registry.affected(&AccessScope::Groups(groups(&["finance"]))).is_empty());
        assert_eq!(registry.affected(&AccessScope::Groups(groups(&["hr"]))), vec![connection]);
    }

    #[test]
    fn expired_registrations_are_swept_unless_heartbeaten() {
        let (registry, clock) = registry();
        let kept = ConnectionId::new("kept");
        let dropped = ConnectionId::new("dropped");
        let _kept_rx = registry.register(&kept, identity("alice"), groups(&["finance"]));
        let _dropped_rx = registry.register(&dropped, identity("bob"), groups(&["hr"]));
        clock.advance_secs(59);
        assert!(registry.heartbeat(&kept));
        clock.advance_secs(2);
        let swept = registry.sweep_expired();
        assert_eq!(swept, 1);
        assert!(registry.identity(&kept).is_some());
        assert!(registry.identity(&dropped).is_none());
    }

    #[test]
    fn heartbeat_for_unknown_connection_reports_false() {
        let (registry, _clock) = registry();
        assert!(!registry.heartbeat(&ConnectionId::new("ghost")));
    }
}
