// crates/toolgate-auth/src/exchange.rs
// ============================================================================
// Module: Credential Exchange
// Description: RFC 8693 token exchange with a safety-buffered cache.
// Purpose: Obtain upstream-audience-scoped credentials for the caller.
// Dependencies: async-trait, reqwest, serde, toolgate-core
// ============================================================================

//! ## Overview
//! Tool execution never forwards the caller's credential upstream. The
//! exchanger trades it for an upstream-audience-scoped token via RFC 8693
//! token exchange, authenticated with the gateway's own client credentials
//! so the identity provider sees who performed the delegation. Exchanged
//! credentials are cached per (subject, audience) and are never served once
//! their remaining validity drops below the safety buffer.
//! Invariants:
//! - Cache TTL is min(token lifetime minus safety buffer, cache ceiling).
//! - A rejected exchange is terminal; only transport failures are
//!   retryable.
//! - Raw tokens never appear in logs; fingerprints only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use toolgate_core::Clock;
use toolgate_core::Timestamp;
use toolgate_core::TtlCache;
use toolgate_core::token_fingerprint;
use url::Url;

// ============================================================================
// SECTION: Protocol Constants
// ============================================================================

/// RFC 8693 grant and token-type identifiers.
///
/// # Invariants
/// - Values are fixed by the token-exchange specification.
pub struct TokenExchangeGrant;

impl TokenExchangeGrant {
    /// Token exchange grant type URN.
    pub const GRANT_TYPE: &'static str = "urn:ietf:params:oauth:grant-type:token-exchange";
    /// Access-token subject token type URN.
    pub const SUBJECT_TOKEN_TYPE: &'static str = "urn:ietf:params:oauth:token-type:access_token";
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Credential exchange errors.
///
/// # Invariants
/// - `Rejected` and `MalformedResponse` are terminal; `Unreachable` is
///   retryable. Messages never include token material.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The identity provider refused the exchange.
    #[error("token exchange rejected: {0}")]
    Rejected(String),
    /// The exchange endpoint could not be reached or timed out.
    #[error("token exchange endpoint unreachable: {0}")]
    Unreachable(String),
    /// The exchange endpoint returned an unparseable response.
    #[error("token exchange response malformed: {0}")]
    MalformedResponse(String),
}

// ============================================================================
// SECTION: Transport Seam
// ============================================================================

/// One exchange request as sent to the endpoint.
///
/// # Invariants
/// - `subject_token` is the caller's verified credential, never a shared
///   service account substitute.
#[derive(Debug, Clone)]
pub struct TokenExchangeForm {
    /// Caller credential being exchanged.
    pub subject_token: String,
    /// Target audience for the issued token.
    pub audience: String,
    /// Scopes requested for the issued token.
    pub scopes: Vec<String>,
}

/// Successful exchange response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeGrantResponse {
    /// Issued access token.
    pub access_token: String,
    /// Issued token lifetime in seconds.
    pub expires_in: i64,
}

/// Transport seam for the token-exchange endpoint.
#[async_trait]
pub trait ExchangeTransport: Send + Sync {
    /// Performs one token exchange call.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] classified by cause.
    async fn exchange(
        &self,
        form: &TokenExchangeForm,
    ) -> Result<TokenExchangeGrantResponse, ExchangeError>;
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// HTTP transport settings.
///
/// # Invariants
/// - `client_secret` is held in memory only; it is never logged.
#[derive(Debug, Clone)]
pub struct HttpExchangeTransportConfig {
    /// Token-exchange endpoint URL.
    pub endpoint: Url,
    /// Gateway client identifier.
    pub client_id: String,
    /// Gateway client secret.
    pub client_secret: String,
    /// Call timeout in milliseconds.
    pub timeout_ms: u64,
}

/// HTTP implementation of the exchange transport.
pub struct HttpExchangeTransport {
    /// Transport settings.
    config: HttpExchangeTransportConfig,
    /// HTTP client with timeout and redirects disabled.
    client: reqwest::Client,
}

impl HttpExchangeTransport {
    /// Creates the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Unreachable`] when the client cannot be built.
    pub fn new(config: HttpExchangeTransportConfig) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ExchangeError::Unreachable(err.to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }
}

#[async_trait]
impl ExchangeTransport for HttpExchangeTransport {
    async fn exchange(
        &self,
        form: &TokenExchangeForm,
    ) -> Result<TokenExchangeGrantResponse, ExchangeError> {
        let scope = form.scopes.join(" ");
        let mut params = vec![
            ("grant_type", TokenExchangeGrant::GRANT_TYPE),
            ("subject_token", form.subject_token.as_str()),
            ("subject_token_type", TokenExchangeGrant::SUBJECT_TOKEN_TYPE),
            ("audience", form.audience.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }
        let response = self
            .client
            .post(self.config.endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|err| ExchangeError::Unreachable(err.to_string()))?;
        let status = response.status();
        if status.is_client_error() {
            return Err(ExchangeError::Rejected(format!(
                "exchange endpoint returned status {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(ExchangeError::Unreachable(format!(
                "exchange endpoint returned status {}",
                status.as_u16()
            )));
        }
        let grant: TokenExchangeGrantResponse = response
            .json()
            .await
            .map_err(|err| ExchangeError::MalformedResponse(err.to_string()))?;
        if grant.access_token.is_empty() || grant.expires_in <= 0 {
            return Err(ExchangeError::MalformedResponse(
                "exchange response missing token or lifetime".to_string(),
            ));
        }
        Ok(grant)
    }
}

// ============================================================================
// SECTION: Exchanger
// ============================================================================

/// Upstream-scoped credential issued by the exchange endpoint.
///
/// # Invariants
/// - `expires_at` is absolute; usability additionally requires the safety
///   buffer to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedCredential {
    /// Issued access token.
    pub access_token: String,
    /// Subject the token was issued for.
    pub subject: String,
    /// Audience the token is scoped to.
    pub audience: String,
    /// Absolute token expiry.
    pub expires_at: Timestamp,
}

/// Exchanger cache and buffer settings.
///
/// # Invariants
/// - `safety_buffer_secs < cache_ceiling_secs` is enforced by config
///   validation.
#[derive(Debug, Clone, Copy)]
pub struct ExchangerConfig {
    /// Remaining validity below which a credential is unusable, in seconds.
    pub safety_buffer_secs: i64,
    /// Upper bound for exchange cache entries in seconds.
    pub cache_ceiling_secs: i64,
}

impl Default for ExchangerConfig {
    fn default() -> Self {
        Self {
            safety_buffer_secs: 30,
            cache_ceiling_secs: 300,
        }
    }
}

/// Credential exchanger with a per-(subject, audience) cache.
pub struct CredentialExchanger {
    /// Buffer and ceiling settings.
    config: ExchangerConfig,
    /// Transport performing the exchange calls.
    transport: Arc<dyn ExchangeTransport>,
    /// Cached credentials keyed by (subject, audience).
    cache: TtlCache<(String, String), ExchangedCredential>,
    /// Time source for buffer decisions.
    clock: Arc<dyn Clock>,
}

impl CredentialExchanger {
    /// Creates an exchanger over the given transport and clock.
    #[must_use]
    pub fn new(
        config: ExchangerConfig,
        transport: Arc<dyn ExchangeTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport,
            cache: TtlCache::new(clock.clone()),
            clock,
        }
    }

    /// Exchanges the caller credential for an audience-scoped token.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the exchange fails; cache misses with
    /// transport failures surface the transport classification unchanged.
    pub async fn exchange(
        &self,
        subject: &str,
        subject_token: &str,
        audience: &str,
        scopes: &[String],
    ) -> Result<ExchangedCredential, ExchangeError> {
        let key = (subject.to_string(), audience.to_string());
        let buffer_ms = self.config.safety_buffer_secs.saturating_mul(1_000);
        if let Some(credential) = self.cache.get(&key) {
            let now = self.clock.now();
            if now.plus_millis(buffer_ms) < credential.expires_at {
                return Ok(credential);
            }
            self.cache.remove(&key);
        }

        let form = TokenExchangeForm {
            subject_token: subject_token.to_string(),
            audience: audience.to_string(),
            scopes: scopes.to_vec(),
        };
        let grant = self.transport.exchange(&form).await?;
        let now = self.clock.now();
        let lifetime_ms = grant.expires_in.saturating_mul(1_000);
        let credential = ExchangedCredential {
            access_token: grant.access_token,
            subject: subject.to_string(),
            audience: audience.to_string(),
            expires_at: now.plus_millis(lifetime_ms),
        };
        let ttl_ms = lifetime_ms
            .saturating_sub(buffer_ms)
            .min(self.config.cache_ceiling_secs.saturating_mul(1_000));
        self.cache.insert(key, credential.clone(), ttl_ms);
        tracing::debug!(
            audience = %audience,
            token = %token_fingerprint(&credential.access_token),
            lifetime_secs = grant.expires_in,
            "credential exchanged"
        );
        Ok(credential)
    }

    /// Returns the number of cached credentials, for diagnostics.
    #[must_use]
    pub fn cached_credentials(&self) -> usize {
        self.cache.len()
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

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use toolgate_core::ManualClock;

    use super::*;

    /// Transport stub issuing fixed-lifetime tokens and counting calls.
    struct CountingTransport {
        /// Number of exchange calls performed.
        calls: AtomicUsize,
        /// Lifetime of issued tokens in seconds.
        lifetime_secs: i64,
    }

    #[async_trait]
    impl ExchangeTransport for CountingTransport {
        async fn exchange(
            &self,
            form: &TokenExchangeForm,
        ) -> Result<TokenExchangeGrantResponse, ExchangeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenExchangeGrantResponse {
                access_token: format!("exchanged-{}-{call}", form.audience),
                expires_in: self.lifetime_secs,
            })
        }
    }

    fn exchanger(
        lifetime_secs: i64,
        buffer_secs: i64,
        ceiling_secs: i64,
    ) -> (CredentialExchanger, Arc<CountingTransport>, Arc<ManualClock>) {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            lifetime_secs,
        });
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(10_000)));
        let exchanger = CredentialExchanger::new(
            ExchangerConfig {
                safety_buffer_secs: buffer_secs,
                cache_ceiling_secs: ceiling_secs,
            },
            transport.clone(),
            clock.clone(),
        );
        (exchanger, transport, clock)
    }

    #[tokio::test]
    async fn cached_credential_is_reused_within_the_buffer() {
        let (exchanger, transport, clock) = exchanger(120, 60, 300);
        let first = exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        clock.advance_secs(59);
        let second = exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lookup_past_the_buffer_forces_re_exchange() {
        let (exchanger, transport, clock) = exchanger(120, 60, 300);
        exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        clock.advance_secs(61);
        let refreshed = exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert!(refreshed.access_token.ends_with("-2"));
    }

    #[tokio::test]
    async fn audiences_are_cached_independently() {
        let (exchanger, transport, _clock) = exchanger(600, 60, 300);
        exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        exchanger.exchange("alice", "raw-token", "reports", &[]).await.unwrap();
        exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(exchanger.cached_credentials(), 2);
    }

    #[tokio::test]
    async fn ceiling_caps_long_lived_tokens() {
        let (exchanger, transport, clock) = exchanger(3_600, 60, 300);
        exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        clock.advance_secs(301);
        exchanger.exchange("alice", "raw-token", "billing", &[]).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
