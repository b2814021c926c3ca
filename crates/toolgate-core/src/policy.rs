// crates/toolgate-core/src/policy.rs
// ============================================================================
// Module: Access Policies
// Description: Policy snapshots and claim-based evaluation.
// Purpose: Map identity claims to allowed tool-group sets, fail closed.
// Dependencies: serde, crate::claims, crate::identifiers
// ============================================================================

//! ## Overview
//! Access policies are immutable snapshots owned by the external policy
//! store. A policy matches an identity iff **all** of its matchers match
//! (AND within a policy); the allowed group sets of every matching policy
//! are **unioned** (OR across policies). Evaluation is pure: no clock, no
//! I/O, no mutation.
//! Invariants:
//! - A policy with zero matchers never matches; empty conditions must not
//!   act as a grant-all.
//! - Disabled policies are skipped regardless of priority.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::claims::ClaimMatcher;
use crate::identifiers::GroupId;
use crate::identifiers::PolicyId;

// ============================================================================
// SECTION: Policy Snapshot
// ============================================================================

/// One authorization rule from the policy store.
///
/// # Invariants
/// - `matchers` are evaluated conjunctively.
/// - `priority` orders evaluation and audit output; it does not affect the
///   union result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Policy identifier.
    pub policy_id: PolicyId,
    /// Evaluation priority; lower values evaluate first.
    pub priority: u32,
    /// Whether the policy participates in evaluation.
    pub enabled: bool,
    /// Conditions that must all match.
    pub matchers: Vec<ClaimMatcher>,
    /// Tool groups granted when the policy matches.
    pub allowed_groups: BTreeSet<GroupId>,
}

impl AccessPolicy {
    /// Returns true when every matcher matches the claim tree.
    ///
    /// Policies without matchers never match: an empty condition list is a
    /// store-side authoring error, not an implicit grant.
    #[must_use]
    pub fn matches(&self, claims: &Value) -> bool {
        if !self.enabled || self.matchers.is_empty() {
            return false;
        }
        self.matchers.iter().all(|matcher| matcher.matches(claims))
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates policies against a claim tree and unions the granted groups.
///
/// Policies are visited in the order supplied by the store (priority order);
/// the result is the union of `allowed_groups` across matching policies and
/// is empty when nothing matches.
#[must_use]
pub fn evaluate_policies(policies: &[AccessPolicy], claims: &Value) -> BTreeSet<GroupId> {
    let mut granted = BTreeSet::new();
    for policy in policies {
        if policy.matches(claims) {
            granted.extend(policy.allowed_groups.iter().cloned());
        }
    }
    granted
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

    use super::*;
    use crate::claims::ClaimOperator;

    fn policy(id: &str, matchers: Vec<ClaimMatcher>, groups: &[&str]) -> AccessPolicy {
        AccessPolicy {
            policy_id: PolicyId::new(id),
            priority: 10,
            enabled: true,
            matchers,
            allowed_groups: groups.iter().map(|group| GroupId::new(*group)).collect(),
        }
    }

    #[test]
    fn single_policy_grants_its_groups_on_match() {
        let policies = vec![policy(
            "finance-access",
            vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user"))],
            &["finance"],
        )];
        let claims = json!({"roles": ["finance_user"]});
        let granted = evaluate_policies(&policies, &claims);
        assert_eq!(granted, BTreeSet::from([GroupId::new("finance")]));
    }

    #[test]
    fn matchers_within_a_policy_are_conjunctive() {
        let policies = vec![policy(
            "finance-emea",
            vec![
                ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user")),
                ClaimMatcher::new("tenant", ClaimOperator::Equals, json!("emea")),
            ],
            &["finance"],
        )];
        let partial = json!({"roles": ["finance_user"], "tenant": "apac"});
        assert!(evaluate_policies(&policies, &partial).is_empty());
        let full = json!({"roles": ["finance_user"], "tenant": "emea"});
        assert!(!evaluate_policies(&policies, &full).is_empty());
    }

    #[test]
    fn groups_union_across_matching_policies() {
        let policies = vec![
            policy(
                "finance",
                vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user"))],
                &["finance", "shared"],
            ),
            policy(
                "hr",
                vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("hr_user"))],
                &["hr", "shared"],
            ),
        ];
        let claims = json!({"roles": ["finance_user", "hr_user"]});
        let granted = evaluate_policies(&policies, &claims);
        let expected: BTreeSet<GroupId> =
            ["finance", "hr", "shared"].into_iter().map(GroupId::new).collect();
        assert_eq!(granted, expected);
    }

    #[test]
    fn unmatched_identity_gets_empty_set() {
        let policies = vec![policy(
            "finance",
            vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user"))],
            &["finance"],
        )];
        let claims = json!({"roles": ["guest"]});
        assert!(evaluate_policies(&policies, &claims).is_empty());
    }

    #[test]
    fn disabled_and_empty_policies_never_match() {
        let mut disabled = policy(
            "disabled",
            vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user"))],
            &["finance"],
        );
        disabled.enabled = false;
        let empty = policy("empty", Vec::new(), &["everything"]);
        let claims = json!({"roles": ["finance_user"]});
        assert!(evaluate_policies(&[disabled, empty], &claims).is_empty());
    }
}
