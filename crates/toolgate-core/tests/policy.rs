//! Policy evaluation tests for toolgate-core.
// crates/toolgate-core/tests/policy.rs
// ============================================================================
// Module: Policy Evaluation Tests
// Description: End-to-end policy evaluation against realistic claim trees.
// Purpose: Ensure AND-within-policy, OR-across-policies, and fail-closed rules.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeSet;

use serde_json::json;
use toolgate_core::AccessPolicy;
use toolgate_core::ClaimMatcher;
use toolgate_core::ClaimOperator;
use toolgate_core::GroupId;
use toolgate_core::PolicyId;
use toolgate_core::evaluate_policies;

fn policy(id: &str, priority: u32, matchers: Vec<ClaimMatcher>, groups: &[&str]) -> AccessPolicy {
    AccessPolicy {
        policy_id: PolicyId::new(id),
        priority,
        enabled: true,
        matchers,
        allowed_groups: groups.iter().map(|group| GroupId::new(*group)).collect(),
    }
}

fn groups(names: &[&str]) -> BTreeSet<GroupId> {
    names.iter().map(|name| GroupId::new(*name)).collect()
}

#[test]
fn finance_role_grants_finance_group() {
    let policies = vec![policy(
        "finance-policy",
        10,
        vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user"))],
        &["finance"],
    )];
    let claims = json!({"sub": "alice", "roles": ["finance_user"]});
    assert_eq!(evaluate_policies(&policies, &claims), groups(&["finance"]));
}

#[test]
fn disjoint_policies_union_their_groups() {
    let policies = vec![
        policy(
            "by-role",
            10,
            vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("auditor"))],
            &["audit"],
        ),
        policy(
            "by-department",
            20,
            vec![ClaimMatcher::new("department", ClaimOperator::Equals, json!("billing"))],
            &["billing-tools"],
        ),
    ];
    let claims = json!({
        "sub": "bob",
        "roles": ["auditor"],
        "department": "billing"
    });
    assert_eq!(evaluate_policies(&policies, &claims), groups(&["audit", "billing-tools"]));
}

#[test]
fn no_matching_policy_yields_empty_set() {
    let policies = vec![policy(
        "admin-only",
        10,
        vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("admin"))],
        &["admin-tools"],
    )];
    let claims = json!({"sub": "carol", "roles": ["viewer"]});
    assert!(evaluate_policies(&policies, &claims).is_empty());
}

#[test]
fn nested_realm_roles_match_through_dot_paths() {
    let policies = vec![policy(
        "realm-admins",
        10,
        vec![ClaimMatcher::new(
            "realm_access.roles",
            ClaimOperator::Contains,
            json!("realm-admin"),
        )],
        &["admin-tools"],
    )];
    let claims = json!({
        "sub": "dave",
        "realm_access": {"roles": ["realm-admin", "user"]}
    });
    assert_eq!(evaluate_policies(&policies, &claims), groups(&["admin-tools"]));
}

#[test]
fn evaluation_is_pure_and_repeatable() {
    let policies = vec![policy(
        "finance-policy",
        10,
        vec![ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user"))],
        &["finance"],
    )];
    let claims = json!({"sub": "alice", "roles": ["finance_user"]});
    let first = evaluate_policies(&policies, &claims);
    let second = evaluate_policies(&policies, &claims);
    assert_eq!(first, second);
}
