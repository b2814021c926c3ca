// crates/toolgate-core/src/hashing.rs
// ============================================================================
// Module: Deterministic Hashing
// Description: Canonical cache-key and token-fingerprint hashing.
// Purpose: Keep access-cache keys deterministic and token logging safe.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Two hash surfaces exist in ToolGate. Access-cache keys hash the
//! access-relevant claim subset through RFC 8785 canonical JSON so the same
//! identity always maps to the same key regardless of claim ordering. Token
//! fingerprints hash raw credentials so logs and caches can correlate a
//! token without ever holding or printing it.
//! Invariants:
//! - Key material is limited to subject, sorted roles, tenant, department.
//! - Raw token bytes never appear in any output of this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Hashing failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashError {
    /// Canonical JSON serialization failed.
    #[error("canonicalization failure: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Access Cache Key
// ============================================================================

/// Access-relevant claim subset used to key the access cache.
///
/// # Invariants
/// - `roles` is sorted and deduplicated before hashing.
/// - Field names are part of the canonical form; renaming them changes every
///   cache key and must be treated as a breaking change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessKeyMaterial {
    /// Stable subject identifier.
    pub subject: String,
    /// Sorted, deduplicated role names.
    pub roles: Vec<String>,
    /// Tenant claim when present.
    pub tenant: Option<String>,
    /// Department claim when present.
    pub department: Option<String>,
}

/// Computes the deterministic access-cache key for the given material.
///
/// The material is canonicalized per RFC 8785 and hashed with SHA-256; the
/// key is the lowercase hex digest prefixed with `acc:` for cache-namespace
/// readability.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when canonical serialization fails.
pub fn access_cache_key(material: &AccessKeyMaterial) -> Result<String, HashError> {
    let canonical = serde_jcs::to_vec(material)
        .map_err(|err| HashError::Canonicalization(err.to_string()))?;
    Ok(format!("acc:{}", hex_digest(&canonical)))
}

// ============================================================================
// SECTION: Token Fingerprint
// ============================================================================

/// Computes a stable, non-reversible fingerprint of a raw credential.
///
/// Used as the identity-cache key and as the only token correlation value
/// permitted in logs and audit events.
#[must_use]
pub fn token_fingerprint(raw_credential: &str) -> String {
    format!("tok:{}", hex_digest(raw_credential.as_bytes()))
}

/// Returns the lowercase hex SHA-256 digest of the input bytes.
fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
