// crates/toolgate-auth/src/keys.rs
// ============================================================================
// Module: Signing Key Resolution
// Description: Key-id to verification-key resolution over a rotating key set.
// Purpose: Give the validator a fail-closed seam for key material.
// Dependencies: async-trait, jsonwebtoken, thiserror
// ============================================================================

//! ## Overview
//! Token validation resolves the signing key by the token's `kid` header.
//! The [`KeyProvider`] trait hides where keys come from: a static set
//! loaded at startup, or a JWKS document fetched from the identity provider
//! and refreshed when an unknown `kid` appears (key rotation). Resolution
//! fails closed: an unknown or unfetchable key rejects the token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key resolution errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No key exists for the requested key id.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
    /// The key source could not be reached or parsed.
    #[error("key source unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Verification Keys
// ============================================================================

/// One resolved verification key with its expected algorithm.
///
/// # Invariants
/// - `algorithm` is pinned per key; tokens presenting a different algorithm
///   for the same `kid` are rejected by the validator.
#[derive(Clone, Debug)]
pub struct VerificationKey {
    /// Decoding key material.
    pub key: DecodingKey,
    /// Algorithm the key verifies.
    pub algorithm: Algorithm,
}

/// Resolves verification keys by key id.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Returns the verification key for a key id.
    ///
    /// Implementations backed by remote key sets should refresh their view
    /// once before reporting an unknown key, so freshly rotated keys are
    /// picked up without a restart.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the key is unknown or the source fails.
    async fn key_for(&self, kid: &str) -> Result<VerificationKey, KeyError>;
}

/// Fixed key set loaded at startup.
///
/// # Invariants
/// - The set is immutable after construction; rotation requires a restart
///   or a remote-backed provider.
#[derive(Default)]
pub struct StaticKeyProvider {
    /// Verification keys by key id.
    keys: BTreeMap<String, VerificationKey>,
}

impl StaticKeyProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key under the given key id.
    #[must_use]
    pub fn with_key(mut self, kid: impl Into<String>, key: VerificationKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn key_for(&self, kid: &str) -> Result<VerificationKey, KeyError> {
        self.keys.get(kid).cloned().ok_or_else(|| KeyError::UnknownKey(kid.to_string()))
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

    use super::*;

    #[tokio::test]
    async fn static_provider_resolves_known_keys_only() {
        let provider = StaticKeyProvider::new().with_key("primary", VerificationKey {
            key: DecodingKey::from_secret(b"test-secret"),
            algorithm: Algorithm::HS256,
        });
        assert!(provider.key_for("primary").await.is_ok());
        let err = provider.key_for("rotated-away").await.unwrap_err();
        assert!(matches!(err, KeyError::UnknownKey(kid) if kid == "rotated-away"));
    }
}
