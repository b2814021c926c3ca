// crates/toolgate-exec/src/upstream.rs
// ============================================================================
// Module: Upstream Transport
// Description: Guarded outbound HTTP transport for rendered requests.
// Purpose: Enforce outbound policy and normalize responses and failures.
// Dependencies: async-trait, reqwest, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The transport performs rendered requests with strict outbound policy:
//! cleartext HTTP is off by default, an optional host allowlist applies,
//! redirects are never followed, and response bodies are capped. Failures
//! are normalized into a small classification (timeout, network, policy)
//! the executor maps onto the invocation error taxonomy.
//! Invariants:
//! - Policy violations are detected before any connection is opened.
//! - Responses larger than the cap fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::render::RenderedRequest;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Transport failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call exceeded its timeout.
    #[error("upstream call timed out")]
    Timeout,
    /// The upstream could not be reached.
    #[error("upstream network failure: {0}")]
    Network(String),
    /// The request was blocked by outbound policy.
    #[error("upstream request blocked by policy: {0}")]
    Policy(String),
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// Normalized upstream response.
///
/// # Invariants
/// - `body` is parsed JSON when the payload is JSON, otherwise the raw text
///   wrapped as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Normalized response body.
    pub body: Value,
}

impl UpstreamResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true for 4xx statuses.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }
}

// ============================================================================
// SECTION: Transport Seam
// ============================================================================

/// Outbound transport for rendered requests.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Performs one rendered request with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] classified by cause; HTTP error statuses
    /// are returned as responses, not transport errors.
    async fn send(
        &self,
        request: &RenderedRequest,
        timeout_ms: i64,
    ) -> Result<UpstreamResponse, TransportError>;
}

// ============================================================================
// SECTION: Outbound Policy
// ============================================================================

/// Outbound request policy.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` URLs.
/// - If `allowed_hosts` is set, only listed hosts are permitted.
/// - `max_response_bytes` is a hard cap on response bodies.
#[derive(Debug, Clone)]
pub struct UpstreamPolicy {
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Optional host allowlist.
    pub allowed_hosts: Option<BTreeSet<String>>,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
}

impl Default for UpstreamPolicy {
    fn default() -> Self {
        Self {
            allow_http: false,
            allowed_hosts: None,
            max_response_bytes: 1024 * 1024,
        }
    }
}

impl UpstreamPolicy {
    /// Checks a rendered request against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Policy`] when the request is blocked.
    pub fn check(&self, request: &RenderedRequest) -> Result<(), TransportError> {
        if request.url.scheme() == "http" && !self.allow_http {
            return Err(TransportError::Policy("cleartext http disabled".to_string()));
        }
        if let Some(allowlist) = &self.allowed_hosts {
            let host = request
                .url
                .host_str()
                .ok_or_else(|| TransportError::Policy("url host required".to_string()))?
                .to_ascii_lowercase();
            if !allowlist.iter().any(|entry| entry.to_ascii_lowercase() == host) {
                return Err(TransportError::Policy(format!("host not allowed: {host}")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Reqwest Transport
// ============================================================================

/// Reqwest-backed [`UpstreamTransport`] with policy enforcement.
pub struct ReqwestTransport {
    /// Outbound policy.
    policy: UpstreamPolicy,
    /// HTTP client; per-request timeouts, redirects disabled.
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given policy.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when the client cannot be built.
    pub fn new(policy: UpstreamPolicy) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            policy,
            client,
        })
    }
}

#[async_trait]
impl UpstreamTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &RenderedRequest,
        timeout_ms: i64,
    ) -> Result<UpstreamResponse, TransportError> {
        self.policy.check(request)?;
        let timeout = Duration::from_millis(u64::try_from(timeout_ms.max(1)).unwrap_or(1));
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let mut builder = self.client.request(method, request.url.clone()).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(err.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let max_bytes = u64::try_from(self.policy.max_response_bytes).unwrap_or(u64::MAX);
        if let Some(length) = response.content_length()
            && length > max_bytes
        {
            return Err(TransportError::Policy("response exceeds size limit".to_string()));
        }
        let bytes = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(err.to_string())
            }
        })?;
        if bytes.len() > self.policy.max_response_bytes {
            return Err(TransportError::Policy("response exceeds size limit".to_string()));
        }
        let body = serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        Ok(UpstreamResponse {
            status,
            body,
        })
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

    use std::collections::BTreeMap;

    use toolgate_contract::HttpMethod;
    use url::Url;

    use super::*;
    use crate::render::upstream_key_for;

    fn request(url: &str) -> RenderedRequest {
        let url = Url::parse(url).unwrap();
        let upstream = upstream_key_for(&url).unwrap();
        RenderedRequest {
            method: HttpMethod::Get,
            url,
            headers: BTreeMap::new(),
            body: None,
            upstream,
        }
    }

    #[test]
    fn cleartext_http_is_blocked_by_default() {
        let policy = UpstreamPolicy::default();
        let err = policy.check(&request("http://api.example.com/x")).unwrap_err();
        assert!(matches!(err, TransportError::Policy(_)));
    }

    #[test]
    fn allowlist_blocks_unlisted_hosts() {
        let policy = UpstreamPolicy {
            allow_http: false,
            allowed_hosts: Some(BTreeSet::from(["api.example.com".to_string()])),
            max_response_bytes: 1024,
        };
        assert!(policy.check(&request("https://api.example.com/x")).is_ok());
        let err = policy.check(&request("https://evil.example.com/x")).unwrap_err();
        assert!(matches!(err, TransportError::Policy(_)));
    }
}
