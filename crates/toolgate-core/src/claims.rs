// crates/toolgate-core/src/claims.rs
// ============================================================================
// Module: Claim Matching
// Description: Dot-path claim navigation and matcher evaluation.
// Purpose: Evaluate policy conditions against identity claims, fail closed.
// Dependencies: serde, serde_json, regex
// ============================================================================

//! ## Overview
//! Claim matchers are the unit condition of access policies: a dot-separated
//! claim path, an operator, an expected value, and a case-sensitivity flag.
//! Evaluation walks the identity's claim tree explicitly; there is no
//! reflection and no expression language.
//! Invariants:
//! - A missing claim path never satisfies any operator, including the
//!   negated ones. Missing data must not widen access.
//! - An invalid `matches` pattern never satisfies its matcher.
//!
//! Security posture: claims originate from caller-supplied tokens and are
//! untrusted until the validator has verified the enclosing signature.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::RegexBuilder;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Claim Path Navigation
// ============================================================================

/// Resolves a dot-separated path against a claim tree.
///
/// Returns `None` when any segment is absent or the intermediate value is
/// not an object. Array indices are intentionally unsupported; policies
/// match array membership through the `contains` operator instead.
#[must_use]
pub fn claim_at_path<'a>(claims: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = claims;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

// ============================================================================
// SECTION: Matcher Types
// ============================================================================

/// Comparison operator applied by a claim matcher.
///
/// # Invariants
/// - Variants are stable for serialized policy snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOperator {
    /// Claim value equals the expected value.
    Equals,
    /// Claim value does not equal the expected value.
    NotEquals,
    /// Claim array contains the expected element, or claim string contains
    /// the expected substring.
    Contains,
    /// Negation of `Contains`.
    NotContains,
    /// Claim string matches the expected regular expression.
    Matches,
    /// Negation of `Matches`.
    NotMatches,
}

impl ClaimOperator {
    /// Returns true for the negated operator variants.
    #[must_use]
    pub const fn is_negated(self) -> bool {
        matches!(self, Self::NotEquals | Self::NotContains | Self::NotMatches)
    }
}

/// One condition evaluated against an identity's claim set.
///
/// # Invariants
/// - `path` is dot-separated; empty segments never resolve.
/// - Matchers are immutable value objects owned by policy snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimMatcher {
    /// Dot-separated claim path, e.g. `realm_access.roles`.
    pub path: String,
    /// Comparison operator.
    pub operator: ClaimOperator,
    /// Expected value compared against the resolved claim.
    pub value: Value,
    /// Whether string comparisons are case sensitive.
    pub case_sensitive: bool,
}

impl ClaimMatcher {
    /// Creates a case-sensitive matcher.
    #[must_use]
    pub fn new(path: impl Into<String>, operator: ClaimOperator, value: Value) -> Self {
        Self {
            path: path.into(),
            operator,
            value,
            case_sensitive: true,
        }
    }

    /// Evaluates this matcher against a claim tree.
    ///
    /// A missing path evaluates to `false` for every operator: negated
    /// operators assert something about a present claim, they do not grant
    /// access on absent data.
    #[must_use]
    pub fn matches(&self, claims: &Value) -> bool {
        let Some(actual) = claim_at_path(claims, &self.path) else {
            return false;
        };
        let positive = match self.operator {
            ClaimOperator::Equals | ClaimOperator::NotEquals => self.check_equals(actual),
            ClaimOperator::Contains | ClaimOperator::NotContains => self.check_contains(actual),
            ClaimOperator::Matches | ClaimOperator::NotMatches => self.check_matches(actual),
        };
        if self.operator.is_negated() { !positive } else { positive }
    }

    /// Compares the resolved claim against the expected value.
    fn check_equals(&self, actual: &Value) -> bool {
        match (actual, &self.value) {
            (Value::String(actual), Value::String(expected)) => {
                self.strings_equal(actual, expected)
            }
            _ => actual == &self.value,
        }
    }

    /// Checks array membership or substring containment.
    fn check_contains(&self, actual: &Value) -> bool {
        match actual {
            Value::Array(elements) => elements.iter().any(|element| {
                match (element, &self.value) {
                    (Value::String(element), Value::String(expected)) => {
                        self.strings_equal(element, expected)
                    }
                    _ => element == &self.value,
                }
            }),
            Value::String(haystack) => {
                self.value.as_str().is_some_and(|needle| {
                    if self.case_sensitive {
                        haystack.contains(needle)
                    } else {
                        haystack.to_lowercase().contains(&needle.to_lowercase())
                    }
                })
            }
            _ => false,
        }
    }

    /// Checks the claim string against the expected regular expression.
    ///
    /// Patterns are compiled with a bounded size so hostile policy snapshots
    /// cannot exhaust memory; a pattern that fails to compile never matches.
    fn check_matches(&self, actual: &Value) -> bool {
        let (Some(actual), Some(pattern)) = (actual.as_str(), self.value.as_str()) else {
            return false;
        };
        RegexBuilder::new(pattern)
            .case_insensitive(!self.case_sensitive)
            .size_limit(1 << 16)
            .build()
            .is_ok_and(|regex| regex.is_match(actual))
    }

    /// Compares two strings honoring the case-sensitivity flag.
    fn strings_equal(&self, left: &str, right: &str) -> bool {
        if self.case_sensitive {
            left == right
        } else {
            left.eq_ignore_ascii_case(right)
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

    use super::*;

    #[test]
    fn path_resolves_nested_objects() {
        let claims = json!({"realm_access": {"roles": ["admin"]}});
        let resolved = claim_at_path(&claims, "realm_access.roles").unwrap();
        assert_eq!(resolved, &json!(["admin"]));
    }

    #[test]
    fn path_misses_on_absent_segment_or_non_object() {
        let claims = json!({"sub": "alice", "roles": ["a"]});
        assert!(claim_at_path(&claims, "tenant.id").is_none());
        assert!(claim_at_path(&claims, "roles.0").is_none());
        assert!(claim_at_path(&claims, "").is_none());
    }

    #[test]
    fn equals_compares_scalars_and_honors_case_flag() {
        let claims = json!({"department": "Finance"});
        let mut matcher =
            ClaimMatcher::new("department", ClaimOperator::Equals, json!("finance"));
        assert!(!matcher.matches(&claims));
        matcher.case_sensitive = false;
        assert!(matcher.matches(&claims));
    }

    #[test]
    fn contains_checks_array_membership() {
        let claims = json!({"roles": ["finance_user", "reader"]});
        let matcher = ClaimMatcher::new("roles", ClaimOperator::Contains, json!("finance_user"));
        assert!(matcher.matches(&claims));
        let absent = ClaimMatcher::new("roles", ClaimOperator::Contains, json!("admin"));
        assert!(!absent.matches(&claims));
    }

    #[test]
    fn contains_checks_substring_for_strings() {
        let claims = json!({"email": "alice@example.com"});
        let matcher = ClaimMatcher::new("email", ClaimOperator::Contains, json!("@example.com"));
        assert!(matcher.matches(&claims));
    }

    #[test]
    fn matches_applies_regex_and_rejects_invalid_patterns() {
        let claims = json!({"sub": "svc-billing-7"});
        let matcher = ClaimMatcher::new("sub", ClaimOperator::Matches, json!("^svc-[a-z]+-\\d$"));
        assert!(matcher.matches(&claims));
        let broken = ClaimMatcher::new("sub", ClaimOperator::Matches, json!("(unclosed"));
        assert!(!broken.matches(&claims));
    }

    #[test]
    fn missing_path_fails_even_for_negated_operators() {
        let claims = json!({"sub": "alice"});
        let matcher = ClaimMatcher::new("tenant", ClaimOperator::NotEquals, json!("acme"));
        assert!(!matcher.matches(&claims));
        let not_contains =
            ClaimMatcher::new("roles", ClaimOperator::NotContains, json!("admin"));
        assert!(!not_contains.matches(&claims));
    }

    #[test]
    fn not_contains_holds_for_present_claim_without_element() {
        let claims = json!({"roles": ["reader"]});
        let matcher = ClaimMatcher::new("roles", ClaimOperator::NotContains, json!("admin"));
        assert!(matcher.matches(&claims));
    }
}
