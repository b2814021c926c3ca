// crates/toolgate-core/src/identity.rs
// ============================================================================
// Module: Validated Identity
// Description: Normalized caller identity produced by credential validation.
// Purpose: Carry the stable identity record consumed by access resolution.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`Identity`] is the normalized output of bearer-credential validation:
//! subject, username, deduplicated role set, the raw claim tree, and the
//! credential expiry. Downstream components treat it as immutable; access
//! resolution derives its cache key from the access-relevant subset only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::claims::claim_at_path;
use crate::hashing::AccessKeyMaterial;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Identity Record
// ============================================================================

/// A validated caller identity.
///
/// # Invariants
/// - `roles` is sorted and deduplicated at construction.
/// - `claims` is the verified claim tree; consumers must not mutate it.
/// - `expires_at` reflects the credential expiry, not any cache TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier (`sub` claim).
    pub subject: String,
    /// Preferred username when the token carries one.
    pub username: Option<String>,
    /// Sorted, deduplicated role names merged from all recognized claim shapes.
    pub roles: Vec<String>,
    /// Full verified claim tree.
    pub claims: Value,
    /// Credential expiry.
    pub expires_at: Timestamp,
}

impl Identity {
    /// Builds an identity, normalizing the role set.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        username: Option<String>,
        mut roles: Vec<String>,
        claims: Value,
        expires_at: Timestamp,
    ) -> Self {
        roles.sort();
        roles.dedup();
        Self {
            subject: subject.into(),
            username,
            roles,
            claims,
            expires_at,
        }
    }

    /// Returns the access-relevant claim subset used for cache keying.
    ///
    /// Only subject, sorted roles, tenant, and department participate, so
    /// irrelevant claim churn (new token ids, refreshed timestamps) does not
    /// invalidate access entries or blow up cache cardinality.
    #[must_use]
    pub fn access_key_material(&self) -> AccessKeyMaterial {
        AccessKeyMaterial {
            subject: self.subject.clone(),
            roles: self.roles.clone(),
            tenant: string_claim(&self.claims, "tenant"),
            department: string_claim(&self.claims, "department"),
        }
    }

    /// Returns true when the identity has the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.binary_search_by(|candidate| candidate.as_str().cmp(role)).is_ok()
    }
}

/// Extracts an optional string claim at the given path.
fn string_claim(claims: &Value, path: &str) -> Option<String> {
    claim_at_path(claims, path).and_then(Value::as_str).map(str::to_string)
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
    fn construction_sorts_and_dedupes_roles() {
        let identity = Identity::new(
            "alice",
            None,
            vec!["writer".to_string(), "admin".to_string(), "writer".to_string()],
            json!({}),
            Timestamp::from_unix_secs(0),
        );
        assert_eq!(identity.roles, vec!["admin".to_string(), "writer".to_string()]);
        assert!(identity.has_role("admin"));
        assert!(!identity.has_role("reader"));
    }

    #[test]
    fn key_material_picks_access_relevant_claims_only() {
        let identity = Identity::new(
            "alice",
            Some("alice@example.com".to_string()),
            vec!["finance_user".to_string()],
            json!({"tenant": "acme", "department": "billing", "jti": "ephemeral"}),
            Timestamp::from_unix_secs(3_600),
        );
        let material = identity.access_key_material();
        assert_eq!(material.subject, "alice");
        assert_eq!(material.tenant.as_deref(), Some("acme"));
        assert_eq!(material.department.as_deref(), Some("billing"));
    }
}
