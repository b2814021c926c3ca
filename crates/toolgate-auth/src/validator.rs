// crates/toolgate-auth/src/validator.rs
// ============================================================================
// Module: Identity Validator
// Description: Bearer credential verification and identity normalization.
// Purpose: Produce stable identity records from untrusted tokens, fail closed.
// Dependencies: jsonwebtoken, serde_json, toolgate-core
// ============================================================================

//! ## Overview
//! The validator verifies an asymmetric-signature JWT end to end: key
//! resolution by `kid`, signature, issuer, audience, and expiry with a
//! small clock-skew allowance, then normalizes the claims into an
//! [`Identity`]. Roles are merged from every recognized claim shape
//! (top-level array, realm roles, per-resource role maps) and deduplicated.
//! Validated identities are cached keyed by token fingerprint for
//! min(remaining lifetime, configured ceiling) so bursty traffic from one
//! caller does not re-verify signatures.
//! Invariants:
//! - Validation failures are terminal; nothing is cached on error.
//! - The cache never outlives the credential it fronts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::errors::ErrorKind;
use serde_json::Value;
use thiserror::Error;
use toolgate_core::Clock;
use toolgate_core::Identity;
use toolgate_core::Timestamp;
use toolgate_core::TtlCache;
use toolgate_core::token_fingerprint;

use crate::keys::KeyError;
use crate::keys::KeyProvider;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Credential validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; messages never include
///   token material.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is malformed, unsigned, or fails a claim check.
    #[error("credential invalid: {0}")]
    Invalid(String),
    /// Token is past its expiry, beyond the allowed skew.
    #[error("credential expired")]
    Expired,
    /// Token references a signing key the gateway does not know.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::UnknownKey(kid) => Self::UnknownKey(kid),
            KeyError::Unavailable(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Validator settings.
///
/// # Invariants
/// - `leeway_secs` is a small skew allowance, not a grace period; expired
///   tokens beyond it are rejected.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Expected token issuer.
    pub issuer: String,
    /// Expected token audience.
    pub audience: String,
    /// Clock-skew allowance in seconds.
    pub leeway_secs: u64,
    /// Upper bound for identity cache entries in seconds.
    pub cache_ceiling_secs: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audience: String::new(),
            leeway_secs: 10,
            cache_ceiling_secs: 300,
        }
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Bearer credential validator with an identity cache.
pub struct IdentityValidator {
    /// Validator settings.
    config: ValidatorConfig,
    /// Signing key resolution seam.
    keys: Arc<dyn KeyProvider>,
    /// Validated identities keyed by token fingerprint.
    cache: TtlCache<String, Identity>,
    /// Time source for cache TTL decisions.
    clock: Arc<dyn Clock>,
}

impl IdentityValidator {
    /// Creates a validator over the given key provider and clock.
    #[must_use]
    pub fn new(config: ValidatorConfig, keys: Arc<dyn KeyProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            keys,
            cache: TtlCache::new(clock.clone()),
            clock,
        }
    }

    /// Validates a raw bearer credential into an identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the credential is invalid, expired, or
    /// signed by an unknown key.
    pub async fn validate(&self, raw_credential: &str) -> Result<Identity, AuthError> {
        let fingerprint = token_fingerprint(raw_credential);
        if let Some(identity) = self.cache.get(&fingerprint) {
            return Ok(identity);
        }

        let header = decode_header(raw_credential)
            .map_err(|err| AuthError::Invalid(err.to_string()))?;
        let kid = header.kid.ok_or_else(|| {
            AuthError::Invalid("token header missing key id".to_string())
        })?;
        let verification = self.keys.key_for(&kid).await?;

        let mut validation = Validation::new(verification.algorithm);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = true;

        let decoded = decode::<Value>(raw_credential, &verification.key, &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(err.to_string()),
            })?;
        let identity = identity_from_claims(&decoded.claims)?;

        let now = self.clock.now();
        let remaining_ms = identity.expires_at.millis_since(now);
        let ttl_ms = remaining_ms.min(self.config.cache_ceiling_secs.saturating_mul(1_000));
        self.cache.insert(fingerprint.clone(), identity.clone(), ttl_ms);
        tracing::debug!(token = %fingerprint, subject = %identity.subject, "credential validated");
        Ok(identity)
    }

    /// Returns the number of cached identities, for diagnostics.
    #[must_use]
    pub fn cached_identities(&self) -> usize {
        self.cache.len()
    }
}

// ============================================================================
// SECTION: Claim Normalization
// ============================================================================

/// Builds an identity from verified claims.
fn identity_from_claims(claims: &Value) -> Result<Identity, AuthError> {
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::Invalid("token missing sub claim".to_string()))?;
    let expires_at = claims
        .get("exp")
        .and_then(Value::as_i64)
        .map(Timestamp::from_unix_secs)
        .ok_or_else(|| AuthError::Invalid("token missing exp claim".to_string()))?;
    let username =
        claims.get("preferred_username").and_then(Value::as_str).map(str::to_string);
    Ok(Identity::new(subject, username, extract_roles(claims), claims.clone(), expires_at))
}

/// Merges roles from every recognized claim shape.
///
/// Recognized shapes: a top-level `roles` array, Keycloak-style
/// `realm_access.roles`, and per-resource `resource_access.<client>.roles`
/// maps. Non-string entries are skipped.
fn extract_roles(claims: &Value) -> Vec<String> {
    let mut roles = Vec::new();
    collect_string_array(claims.get("roles"), &mut roles);
    collect_string_array(
        claims.get("realm_access").and_then(|realm| realm.get("roles")),
        &mut roles,
    );
    if let Some(resources) = claims.get("resource_access").and_then(Value::as_object) {
        for resource in resources.values() {
            collect_string_array(resource.get("roles"), &mut roles);
        }
    }
    roles
}

/// Appends string array elements to the accumulator.
fn collect_string_array(value: Option<&Value>, into: &mut Vec<String>) {
    if let Some(Value::Array(elements)) = value {
        for element in elements {
            if let Some(role) = element.as_str() {
                into.push(role.to_string());
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

    use super::*;

    #[test]
    fn roles_merge_across_all_claim_shapes() {
        let claims = json!({
            "roles": ["top_level"],
            "realm_access": {"roles": ["realm_role", "top_level"]},
            "resource_access": {
                "billing": {"roles": ["billing_user"]},
                "reports": {"roles": ["report_viewer"]}
            }
        });
        let mut roles = extract_roles(&claims);
        roles.sort();
        roles.dedup();
        assert_eq!(roles, vec![
            "billing_user".to_string(),
            "realm_role".to_string(),
            "report_viewer".to_string(),
            "top_level".to_string(),
        ]);
    }

    #[test]
    fn identity_requires_sub_and_exp() {
        let missing_sub = json!({"exp": 100});
        assert!(matches!(identity_from_claims(&missing_sub), Err(AuthError::Invalid(_))));
        let missing_exp = json!({"sub": "alice"});
        assert!(matches!(identity_from_claims(&missing_exp), Err(AuthError::Invalid(_))));
        let complete = json!({"sub": "alice", "exp": 100, "roles": ["a"]});
        let identity = identity_from_claims(&complete).unwrap();
        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.expires_at, Timestamp::from_unix_secs(100));
    }
}
