// crates/toolgate-auth/src/jwks.rs
// ============================================================================
// Module: JWKS Key Provider
// Description: Remote JWKS fetching with refresh-on-unknown-kid rotation.
// Purpose: Track identity-provider key rotation without gateway restarts.
// Dependencies: jsonwebtoken, reqwest, tokio, toolgate-core
// ============================================================================

//! ## Overview
//! The [`HttpJwksProvider`] resolves verification keys from a JWKS document
//! published by the identity provider. The parsed set is cached in-process;
//! a lookup for an unknown `kid` triggers one refresh (rate limited by a
//! minimum interval) before failing, which is how key rotation is absorbed.
//! Invariants:
//! - Fetch failures never widen access; they surface as unavailable keys.
//! - Refreshes are rate limited so a flood of bad `kid`s cannot hammer the
//!   identity provider.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use tokio::sync::RwLock;
use toolgate_core::Clock;
use toolgate_core::Timestamp;
use url::Url;

use crate::keys::KeyError;
use crate::keys::KeyProvider;
use crate::keys::VerificationKey;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// JWKS provider settings.
///
/// # Invariants
/// - `min_refresh_interval_ms` bounds how often unknown-kid lookups may
///   trigger a remote fetch.
#[derive(Debug, Clone)]
pub struct JwksProviderConfig {
    /// JWKS document URL.
    pub jwks_url: Url,
    /// Fetch timeout in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Minimum interval between refreshes in milliseconds.
    pub min_refresh_interval_ms: i64,
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Cached JWKS view guarded by one lock.
#[derive(Default)]
struct JwksState {
    /// Parsed verification keys by key id.
    keys: BTreeMap<String, VerificationKey>,
    /// When the set was last fetched.
    last_refresh: Option<Timestamp>,
}

/// Remote JWKS-backed [`KeyProvider`].
pub struct HttpJwksProvider {
    /// Provider settings.
    config: JwksProviderConfig,
    /// HTTP client used for fetches.
    client: reqwest::Client,
    /// Cached key set.
    state: RwLock<JwksState>,
    /// Time source for refresh rate limiting.
    clock: Arc<dyn Clock>,
}

impl HttpJwksProvider {
    /// Creates a provider; the first lookup triggers the initial fetch.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Unavailable`] when the HTTP client cannot be built.
    pub fn new(config: JwksProviderConfig, clock: Arc<dyn Clock>) -> Result<Self, KeyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| KeyError::Unavailable(err.to_string()))?;
        Ok(Self {
            config,
            client,
            state: RwLock::new(JwksState::default()),
            clock,
        })
    }

    /// Fetches and parses the JWKS document, replacing the cached set.
    async fn refresh(&self) -> Result<(), KeyError> {
        let response = self
            .client
            .get(self.config.jwks_url.clone())
            .send()
            .await
            .map_err(|err| KeyError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(KeyError::Unavailable(format!(
                "jwks endpoint returned status {}",
                response.status().as_u16()
            )));
        }
        let document: JwkSet =
            response.json().await.map_err(|err| KeyError::Unavailable(err.to_string()))?;
        let mut keys = BTreeMap::new();
        for jwk in &document.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            let Ok(key) = DecodingKey::from_jwk(jwk) else {
                tracing::warn!(kid = %kid, "skipping unparseable jwk entry");
                continue;
            };
            let algorithm = jwk
                .common
                .key_algorithm
                .and_then(|alg| Algorithm::from_str(&alg.to_string()).ok())
                .unwrap_or(Algorithm::RS256);
            keys.insert(kid, VerificationKey {
                key,
                algorithm,
            });
        }
        let mut state = self.state.write().await;
        tracing::debug!(keys = keys.len(), "jwks key set refreshed");
        state.keys = keys;
        state.last_refresh = Some(self.clock.now());
        Ok(())
    }

    /// Returns true when a refresh is permitted by the rate limit.
    async fn refresh_permitted(&self) -> bool {
        let state = self.state.read().await;
        state.last_refresh.is_none_or(|last| {
            self.clock.now().millis_since(last) >= self.config.min_refresh_interval_ms
        })
    }
}

#[async_trait]
impl KeyProvider for HttpJwksProvider {
    async fn key_for(&self, kid: &str) -> Result<VerificationKey, KeyError> {
        {
            let state = self.state.read().await;
            if let Some(key) = state.keys.get(kid) {
                return Ok(key.clone());
            }
        }
        if self.refresh_permitted().await {
            self.refresh().await?;
            let state = self.state.read().await;
            if let Some(key) = state.keys.get(kid) {
                return Ok(key.clone());
            }
        }
        Err(KeyError::UnknownKey(kid.to_string()))
    }
}
