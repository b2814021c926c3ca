//! Identity validation tests for toolgate-auth.
// crates/toolgate-auth/tests/validator.rs
// ============================================================================
// Module: Identity Validator Tests
// Description: End-to-end bearer validation against a static key set.
// Purpose: Ensure signature, claim, and rotation failures all reject.
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

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::encode;
use serde_json::json;
use toolgate_auth::AuthError;
use toolgate_auth::IdentityValidator;
use toolgate_auth::KeyError;
use toolgate_auth::KeyProvider;
use toolgate_auth::StaticKeyProvider;
use toolgate_auth::ValidatorConfig;
use toolgate_auth::VerificationKey;
use toolgate_core::SystemClock;

const SECRET: &[u8] = b"test-signing-secret";

fn unix_now() -> i64 {
    i64::try_from(
        SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or(0),
    )
    .unwrap_or(0)
}

fn provider() -> Arc<StaticKeyProvider> {
    Arc::new(StaticKeyProvider::new().with_key("primary", VerificationKey {
        key: DecodingKey::from_secret(SECRET),
        algorithm: Algorithm::HS256,
    }))
}

fn validator(keys: Arc<dyn KeyProvider>) -> IdentityValidator {
    IdentityValidator::new(
        ValidatorConfig {
            issuer: "https://idp.example.com/realms/agents".to_string(),
            audience: "toolgate".to_string(),
            leeway_secs: 10,
            cache_ceiling_secs: 300,
        },
        keys,
        Arc::new(SystemClock),
    )
}

fn token(kid: &str, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(SECRET)).expect("encode token")
}

fn valid_claims() -> serde_json::Value {
    json!({
        "iss": "https://idp.example.com/realms/agents",
        "aud": "toolgate",
        "sub": "alice",
        "exp": unix_now() + 600,
        "preferred_username": "alice@example.com",
        "roles": ["finance_user"],
        "realm_access": {"roles": ["default-roles"]},
        "resource_access": {"billing": {"roles": ["billing_user"]}}
    })
}

#[tokio::test]
async fn valid_token_yields_normalized_identity() {
    let validator = validator(provider());
    let identity = validator.validate(&token("primary", &valid_claims())).await.unwrap();
    assert_eq!(identity.subject, "alice");
    assert_eq!(identity.username.as_deref(), Some("alice@example.com"));
    assert_eq!(identity.roles, vec![
        "billing_user".to_string(),
        "default-roles".to_string(),
        "finance_user".to_string(),
    ]);
}

#[tokio::test]
async fn expired_token_is_rejected_as_expired() {
    let validator = validator(provider());
    let mut claims = valid_claims();
    claims["exp"] = json!(unix_now() - 3_600);
    let err = validator.validate(&token("primary", &claims)).await.unwrap_err();
    assert!(matches!(err, AuthError::Expired));
}

#[tokio::test]
async fn unknown_kid_is_rejected_as_unknown_key() {
    let validator = validator(provider());
    let err = validator.validate(&token("rotated-away", &valid_claims())).await.unwrap_err();
    assert!(matches!(err, AuthError::UnknownKey(kid) if kid == "rotated-away"));
}

#[tokio::test]
async fn wrong_audience_is_rejected_as_invalid() {
    let validator = validator(provider());
    let mut claims = valid_claims();
    claims["aud"] = json!("someone-else");
    let err = validator.validate(&token("primary", &claims)).await.unwrap_err();
    assert!(matches!(err, AuthError::Invalid(_)));
}

#[tokio::test]
async fn garbage_credential_is_rejected_as_invalid() {
    let validator = validator(provider());
    let err = validator.validate("not-a-jwt").await.unwrap_err();
    assert!(matches!(err, AuthError::Invalid(_)));
}

/// Key provider wrapper counting resolutions, to observe the identity cache.
struct CountingProvider {
    /// Wrapped provider.
    inner: Arc<StaticKeyProvider>,
    /// Number of key resolutions performed.
    resolutions: AtomicUsize,
}

#[async_trait]
impl KeyProvider for CountingProvider {
    async fn key_for(&self, kid: &str) -> Result<VerificationKey, KeyError> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        self.inner.key_for(kid).await
    }
}

#[tokio::test]
async fn repeated_validation_is_served_from_the_identity_cache() {
    let counting = Arc::new(CountingProvider {
        inner: provider(),
        resolutions: AtomicUsize::new(0),
    });
    let validator = validator(counting.clone());
    let bearer = token("primary", &valid_claims());
    let first = validator.validate(&bearer).await.unwrap();
    let second = validator.validate(&bearer).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(counting.resolutions.load(Ordering::SeqCst), 1);
    assert_eq!(validator.cached_identities(), 1);
}
