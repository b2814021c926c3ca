// crates/toolgate-config/src/lib.rs
// ============================================================================
// Module: ToolGate Configuration
// Description: Canonical configuration model, strict loading, validation.
// Purpose: Give every gateway component validated, fail-closed settings.
// Dependencies: serde, toml, url, thiserror
// ============================================================================

//! ## Overview
//! One TOML document configures the whole gateway: credential validation,
//! token exchange, access and catalog caching, breaker thresholds, outbound
//! execution policy, the server surface, and optional static store
//! snapshots. Loading is strict (path length, file size, UTF-8) and
//! `validate` enforces every cross-field constraint; an invalid config
//! never produces a partially working gateway.
//! Invariants:
//! - Defaults are safe: loopback bind, cleartext HTTP off, fail-closed
//!   timeouts and thresholds.
//! - Secrets are referenced by environment variable name, never stored in
//!   the config file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted config path length in bytes.
const MAX_CONFIG_PATH_BYTES: usize = 4_096;
/// Maximum accepted path component length in bytes.
const MAX_PATH_COMPONENT_BYTES: usize = 255;
/// Maximum accepted config file size in bytes.
const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config input violated a load guard.
    #[error("config load rejected: {0}")]
    Load(String),
    /// Config document failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config values failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Credential validation settings.
///
/// # Invariants
/// - `issuer` and `audience` are non-empty after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Expected token issuer.
    pub issuer: String,
    /// Expected token audience.
    pub audience: String,
    /// JWKS document URL; omitted when keys are provisioned statically.
    #[serde(default)]
    pub jwks_url: Option<String>,
    /// Clock-skew allowance in seconds.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
    /// Identity cache ceiling in seconds.
    #[serde(default = "default_identity_cache_ceiling_secs")]
    pub identity_cache_ceiling_secs: i64,
}

/// Token exchange settings.
///
/// # Invariants
/// - `client_secret_env` names an environment variable; the secret itself
///   never lives in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeConfig {
    /// Token-exchange endpoint URL.
    pub endpoint: String,
    /// Gateway client identifier.
    pub client_id: String,
    /// Environment variable holding the gateway client secret.
    pub client_secret_env: String,
    /// Exchange call timeout in milliseconds.
    #[serde(default = "default_exchange_timeout_ms")]
    pub timeout_ms: u64,
    /// Remaining-validity safety buffer in seconds.
    #[serde(default = "default_safety_buffer_secs")]
    pub safety_buffer_secs: i64,
    /// Exchange cache ceiling in seconds.
    #[serde(default = "default_exchange_cache_ceiling_secs")]
    pub cache_ceiling_secs: i64,
}

/// Access and catalog cache settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Process-local access tier TTL in seconds.
    #[serde(default = "default_l1_ttl_secs")]
    pub l1_ttl_secs: i64,
    /// Shared access tier TTL in seconds.
    #[serde(default = "default_l2_ttl_secs")]
    pub l2_ttl_secs: i64,
    /// Per-group catalog cache TTL in seconds.
    #[serde(default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: i64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            l1_ttl_secs: default_l1_ttl_secs(),
            l2_ttl_secs: default_l2_ttl_secs(),
            catalog_ttl_secs: default_catalog_ttl_secs(),
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerSection {
    /// Failures within the window that open a circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Rolling failure window in seconds.
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: i64,
    /// Cooldown before trial calls in seconds.
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: i64,
    /// Consecutive half-open successes required to close.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Idle period before an upstream entry is evicted, in seconds.
    #[serde(default = "default_idle_eviction_secs")]
    pub idle_eviction_secs: i64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window_secs(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            success_threshold: default_success_threshold(),
            idle_eviction_secs: default_idle_eviction_secs(),
        }
    }
}

/// Outbound execution policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Default per-call timeout in milliseconds.
    #[serde(default = "default_execution_timeout_ms")]
    pub default_timeout_ms: i64,
    /// Maximum upstream response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Allow cleartext HTTP to upstreams (disabled by default).
    #[serde(default)]
    pub allow_http: bool,
    /// Optional upstream host allowlist.
    #[serde(default)]
    pub allowed_hosts: Option<BTreeSet<String>>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_execution_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
            allow_http: false,
            allowed_hosts: None,
        }
    }
}

/// Server surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address for the HTTP surface.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Subscription TTL refreshed by heartbeats, in seconds.
    #[serde(default = "default_heartbeat_ttl_secs")]
    pub heartbeat_ttl_secs: i64,
    /// Per-subscriber push buffer size.
    #[serde(default = "default_push_buffer")]
    pub push_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            heartbeat_ttl_secs: default_heartbeat_ttl_secs(),
            push_buffer: default_push_buffer(),
        }
    }
}

/// Static store snapshot settings.
///
/// # Invariants
/// - Paths are optional; when absent the gateway must be wired to external
///   stores programmatically.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StoresConfig {
    /// JSON file holding the access policy snapshot.
    #[serde(default)]
    pub policy_snapshot: Option<String>,
    /// JSON file holding the tool and group catalog snapshot.
    #[serde(default)]
    pub catalog_snapshot: Option<String>,
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolGateConfig {
    /// Credential validation settings.
    pub auth: AuthConfig,
    /// Token exchange settings.
    pub exchange: ExchangeConfig,
    /// Access and catalog cache settings.
    #[serde(default)]
    pub access: AccessConfig,
    /// Circuit breaker settings.
    #[serde(default)]
    pub breaker: BreakerSection,
    /// Outbound execution policy.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Server surface settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Static store snapshots.
    #[serde(default)]
    pub stores: StoresConfig,
}

impl ToolGateConfig {
    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a load guard, the parser, or validation
    /// rejects the input.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path_text = path.to_string_lossy();
        if path_text.len() > MAX_CONFIG_PATH_BYTES {
            return Err(ConfigError::Load("config path exceeds max length".to_string()));
        }
        for component in path.components() {
            if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_BYTES {
                return Err(ConfigError::Load("config path component too long".to_string()));
            }
        }
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_BYTES {
            return Err(ConfigError::Load("config file exceeds size limit".to_string()));
        }
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Load("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every cross-field constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.issuer.trim().is_empty() {
            return Err(ConfigError::Invalid("auth issuer must not be empty".to_string()));
        }
        if self.auth.audience.trim().is_empty() {
            return Err(ConfigError::Invalid("auth audience must not be empty".to_string()));
        }
        if self.auth.leeway_secs > 60 {
            return Err(ConfigError::Invalid(
                "auth leeway exceeds 60 second ceiling".to_string(),
            ));
        }
        if self.auth.identity_cache_ceiling_secs <= 0 {
            return Err(ConfigError::Invalid(
                "identity cache ceiling must be positive".to_string(),
            ));
        }
        if let Some(jwks_url) = &self.auth.jwks_url {
            validate_https_url(jwks_url, "auth jwks_url")?;
        }

        validate_https_url(&self.exchange.endpoint, "exchange endpoint")?;
        if self.exchange.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("exchange client_id must not be empty".to_string()));
        }
        if self.exchange.client_secret_env.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "exchange client_secret_env must not be empty".to_string(),
            ));
        }
        if self.exchange.timeout_ms == 0 {
            return Err(ConfigError::Invalid("exchange timeout must be positive".to_string()));
        }
        if self.exchange.safety_buffer_secs <= 0 {
            return Err(ConfigError::Invalid(
                "exchange safety buffer must be positive".to_string(),
            ));
        }
        if self.exchange.safety_buffer_secs >= self.exchange.cache_ceiling_secs {
            return Err(ConfigError::Invalid(
                "exchange safety buffer must be below cache ceiling".to_string(),
            ));
        }

        if self.access.l1_ttl_secs <= 0 || self.access.l2_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("access tier ttls must be positive".to_string()));
        }
        if self.access.l1_ttl_secs > self.access.l2_ttl_secs {
            return Err(ConfigError::Invalid(
                "access l1 ttl must not exceed l2 ttl".to_string(),
            ));
        }
        if self.access.catalog_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("catalog ttl must be positive".to_string()));
        }

        if self.breaker.failure_threshold == 0 || self.breaker.success_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker thresholds must be at least 1".to_string(),
            ));
        }
        if self.breaker.failure_window_secs <= 0
            || self.breaker.recovery_timeout_secs <= 0
            || self.breaker.idle_eviction_secs <= 0
        {
            return Err(ConfigError::Invalid(
                "breaker windows and timeouts must be positive".to_string(),
            ));
        }

        if self.execution.default_timeout_ms <= 0 {
            return Err(ConfigError::Invalid(
                "execution default timeout must be positive".to_string(),
            ));
        }
        if self.execution.max_response_bytes == 0 {
            return Err(ConfigError::Invalid(
                "execution max response bytes must be positive".to_string(),
            ));
        }

        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid("server bind address invalid".to_string()))?;
        if self.server.heartbeat_ttl_secs <= 0 {
            return Err(ConfigError::Invalid(
                "server heartbeat ttl must be positive".to_string(),
            ));
        }
        if self.server.push_buffer == 0 {
            return Err(ConfigError::Invalid(
                "server push buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true when the configured bind address is loopback.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the bind address fails to parse.
    pub fn bind_is_loopback(&self) -> Result<bool, ConfigError> {
        let bind: SocketAddr = self
            .server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid("server bind address invalid".to_string()))?;
        Ok(bind.ip().is_loopback())
    }
}

/// Validates that a URL parses and uses HTTPS.
fn validate_https_url(value: &str, label: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|_| ConfigError::Invalid(format!("{label} is not a valid url")))?;
    if url.scheme() != "https" {
        return Err(ConfigError::Invalid(format!("{label} must use https")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default clock-skew allowance.
const fn default_leeway_secs() -> u64 {
    10
}

/// Default identity cache ceiling.
const fn default_identity_cache_ceiling_secs() -> i64 {
    300
}

/// Default exchange call timeout.
const fn default_exchange_timeout_ms() -> u64 {
    10_000
}

/// Default exchange safety buffer.
const fn default_safety_buffer_secs() -> i64 {
    30
}

/// Default exchange cache ceiling.
const fn default_exchange_cache_ceiling_secs() -> i64 {
    300
}

/// Default L1 access TTL.
const fn default_l1_ttl_secs() -> i64 {
    60
}

/// Default L2 access TTL.
const fn default_l2_ttl_secs() -> i64 {
    300
}

/// Default catalog TTL.
const fn default_catalog_ttl_secs() -> i64 {
    120
}

/// Default breaker failure threshold.
const fn default_failure_threshold() -> u32 {
    5
}

/// Default breaker failure window.
const fn default_failure_window_secs() -> i64 {
    30
}

/// Default breaker recovery timeout.
const fn default_recovery_timeout_secs() -> i64 {
    30
}

/// Default breaker success threshold.
const fn default_success_threshold() -> u32 {
    2
}

/// Default breaker idle eviction period.
const fn default_idle_eviction_secs() -> i64 {
    900
}

/// Default per-call execution timeout.
const fn default_execution_timeout_ms() -> i64 {
    30_000
}

/// Default response size cap.
const fn default_max_response_bytes() -> usize {
    1_048_576
}

/// Default loopback bind address.
fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

/// Default heartbeat TTL.
const fn default_heartbeat_ttl_secs() -> i64 {
    60
}

/// Default per-subscriber push buffer.
const fn default_push_buffer() -> usize {
    64
}
