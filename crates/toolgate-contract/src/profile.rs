// crates/toolgate-contract/src/profile.rs
// ============================================================================
// Module: Execution Profiles
// Description: Declarative request templates and polling configuration.
// Purpose: Describe how a tool is invoked without embedding executable logic.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! An execution profile is the complete, declarative description of how one
//! tool is invoked: HTTP method, URL/header/body templates over a declared
//! variable set, the target audience for credential exchange, timeouts, and
//! (for asynchronous tools) the polling configuration. Profiles carry no
//! executable expressions; rendering substitutes declared variables only,
//! which is what keeps template injection out of the execution path.
//! Invariants:
//! - Async profiles always carry a poll configuration.
//! - `max_attempts` bounds every polling loop; profiles with zero attempts
//!   are rejected at validation time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Profile validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Async profile without polling configuration.
    #[error("async profile requires poll configuration")]
    MissingPollConfig,
    /// Poll configuration with a zero attempt bound.
    #[error("poll configuration requires max_attempts >= 1")]
    UnboundedPoll,
    /// Poll interval settings that cannot produce forward progress.
    #[error("poll interval configuration invalid: {0}")]
    InvalidPollInterval(String),
    /// Non-positive execution timeout.
    #[error("execution timeout must be positive")]
    InvalidTimeout,
    /// Empty required audience.
    #[error("required audience must not be empty")]
    MissingAudience,
}

// ============================================================================
// SECTION: Profile Types
// ============================================================================

/// Invocation mode for a tool.
///
/// # Invariants
/// - Variants are stable wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One request, one response.
    Sync,
    /// Trigger request followed by a bounded polling loop.
    AsyncPoll,
}

/// HTTP method used by the rendered request.
///
/// # Invariants
/// - Variants are stable wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP PUT.
    Put,
    /// HTTP PATCH.
    Patch,
    /// HTTP DELETE.
    Delete,
}

impl HttpMethod {
    /// Returns the method as an HTTP token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Polling configuration for asynchronous tools.
///
/// # Invariants
/// - `max_attempts >= 1`; the loop never runs unbounded.
/// - Interval growth is `initial * multiplier^n`, capped at `max_interval_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// JSON path extracting the job identifier from the trigger response.
    pub job_id_path: String,
    /// URL template for status requests; may reference `job_id`.
    pub status_url_template: String,
    /// JSON path extracting the status value from a poll response.
    pub status_path: String,
    /// Status values indicating completion.
    pub completed_values: BTreeSet<String>,
    /// Status values indicating failure.
    pub failed_values: BTreeSet<String>,
    /// JSON path extracting the final result on completion.
    pub result_path: Option<String>,
    /// First poll delay in milliseconds.
    pub initial_interval_ms: i64,
    /// Backoff multiplier applied per attempt.
    pub multiplier: f64,
    /// Upper bound for any single poll delay in milliseconds.
    pub max_interval_ms: i64,
    /// Hard bound on poll attempts.
    pub max_attempts: u32,
}

impl PollConfig {
    /// Returns the delay before the given zero-based poll attempt.
    ///
    /// Growth is exponential in the attempt index and saturates at the
    /// configured cap, so the total async duration stays bounded by
    /// `max_attempts * max_interval_ms`.
    #[must_use]
    pub fn interval_for_attempt(&self, attempt: u32) -> i64 {
        let multiplier = if self.multiplier < 1.0 { 1.0 } else { self.multiplier };
        let factor = multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let scaled = (self.initial_interval_ms as f64) * factor;
        if !scaled.is_finite() || scaled >= self.max_interval_ms as f64 {
            self.max_interval_ms
        } else {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Value is finite and below max_interval_ms, which fits i64."
            )]
            let bounded = scaled as i64;
            bounded.max(0)
        }
    }

    /// Validates interval and attempt bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the configuration cannot terminate or
    /// make forward progress.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.max_attempts == 0 {
            return Err(ProfileError::UnboundedPoll);
        }
        if self.initial_interval_ms <= 0 {
            return Err(ProfileError::InvalidPollInterval(
                "initial interval must be positive".to_string(),
            ));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(ProfileError::InvalidPollInterval(
                "max interval below initial interval".to_string(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(ProfileError::InvalidPollInterval(
                "multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Declarative description of how a tool is invoked.
///
/// # Invariants
/// - Templates reference declared `variables` only; rendering rejects
///   undeclared placeholders.
/// - `required_audience` is the token-exchange audience, never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Invocation mode.
    pub mode: ExecutionMode,
    /// HTTP method of the trigger request.
    pub method: HttpMethod,
    /// URL template for the trigger request.
    pub url_template: String,
    /// Header templates keyed by header name.
    pub header_templates: BTreeMap<String, String>,
    /// Optional JSON body template.
    pub body_template: Option<Value>,
    /// Argument variables templates may reference.
    pub variables: BTreeSet<String>,
    /// Optional JSON path remapping the success response.
    pub response_mapping: Option<String>,
    /// Poll configuration; required for async profiles.
    pub poll: Option<PollConfig>,
    /// Per-call execution timeout in milliseconds.
    pub timeout_ms: Option<i64>,
    /// Audience the caller credential is exchanged for.
    pub required_audience: String,
    /// Scopes requested during credential exchange.
    pub required_scopes: Vec<String>,
}

impl ExecutionProfile {
    /// Validates the profile for catalog admission.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the profile is internally inconsistent.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.required_audience.trim().is_empty() {
            return Err(ProfileError::MissingAudience);
        }
        if let Some(timeout_ms) = self.timeout_ms
            && timeout_ms <= 0
        {
            return Err(ProfileError::InvalidTimeout);
        }
        match (self.mode, &self.poll) {
            (ExecutionMode::AsyncPoll, None) => Err(ProfileError::MissingPollConfig),
            (ExecutionMode::AsyncPoll, Some(poll)) => poll.validate(),
            (ExecutionMode::Sync, _) => Ok(()),
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

    use super::*;

    fn poll() -> PollConfig {
        PollConfig {
            job_id_path: "$.job_id".to_string(),
            status_url_template: "https://jobs.example.com/{{job_id}}".to_string(),
            status_path: "$.status".to_string(),
            completed_values: BTreeSet::from(["completed".to_string()]),
            failed_values: BTreeSet::from(["failed".to_string()]),
            result_path: Some("$.result".to_string()),
            initial_interval_ms: 100,
            multiplier: 2.0,
            max_interval_ms: 1_000,
            max_attempts: 5,
        }
    }

    fn sync_profile() -> ExecutionProfile {
        ExecutionProfile {
            mode: ExecutionMode::Sync,
            method: HttpMethod::Post,
            url_template: "https://api.example.com/invoices/{{invoice_id}}".to_string(),
            header_templates: BTreeMap::new(),
            body_template: None,
            variables: BTreeSet::from(["invoice_id".to_string()]),
            response_mapping: None,
            poll: None,
            timeout_ms: Some(30_000),
            required_audience: "billing".to_string(),
            required_scopes: vec!["invoices:read".to_string()],
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let poll = poll();
        assert_eq!(poll.interval_for_attempt(0), 100);
        assert_eq!(poll.interval_for_attempt(1), 200);
        assert_eq!(poll.interval_for_attempt(2), 400);
        assert_eq!(poll.interval_for_attempt(3), 800);
        assert_eq!(poll.interval_for_attempt(4), 1_000);
        assert_eq!(poll.interval_for_attempt(30), 1_000);
    }

    #[test]
    fn async_profile_requires_poll_config() {
        let mut profile = sync_profile();
        profile.mode = ExecutionMode::AsyncPoll;
        assert!(matches!(profile.validate(), Err(ProfileError::MissingPollConfig)));
        profile.poll = Some(poll());
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn zero_attempt_poll_is_rejected() {
        let mut config = poll();
        config.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ProfileError::UnboundedPoll)));
    }

    #[test]
    fn empty_audience_is_rejected() {
        let mut profile = sync_profile();
        profile.required_audience = "  ".to_string();
        assert!(matches!(profile.validate(), Err(ProfileError::MissingAudience)));
    }
}
