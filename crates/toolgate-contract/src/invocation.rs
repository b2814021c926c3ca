// crates/toolgate-contract/src/invocation.rs
// ============================================================================
// Module: Invocation Wire Types
// Description: Tool invocation requests, results, and the error taxonomy.
// Purpose: Give agents a stable, retry-aware result contract.
// Dependencies: serde, serde_json, toolgate-core
// ============================================================================

//! ## Overview
//! A tool invocation either completes with a result value or fails with a
//! structured error carrying a stable code, a message, and a `retryable`
//! flag (plus an optional retry delay). Agents branch on `retryable`; they
//! never need to parse messages. The code-to-retryability mapping is fixed
//! here so every component classifies failures identically.
//! Invariants:
//! - Authentication and authorization failures are terminal at this surface.
//! - Exchange rejections and upstream 4xx responses are terminal; transport
//!   failures, upstream 5xx, and open circuits are retryable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use toolgate_core::ToolId;

// ============================================================================
// SECTION: Request
// ============================================================================

/// Tool invocation request submitted by an agent.
///
/// # Invariants
/// - `arguments` is validated against the tool's input schema before any
///   network call is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Tool to invoke.
    pub tool_id: ToolId,
    /// Tool arguments as a JSON object.
    pub arguments: Value,
}

// ============================================================================
// SECTION: Error Taxonomy
// ============================================================================

/// Stable invocation error codes.
///
/// # Invariants
/// - Codes are append-only wire values; retryability per code is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Credential missing, invalid, expired, or signed by an unknown key.
    Unauthorized,
    /// Tool or group outside the caller's resolved access set.
    Forbidden,
    /// Arguments failed schema validation or template rendering.
    InvalidArguments,
    /// Token exchange was rejected by the identity provider.
    ExchangeRejected,
    /// Token exchange endpoint was unreachable or timed out.
    ExchangeUnreachable,
    /// Token exchange returned an unparseable response.
    ExchangeMalformed,
    /// Upstream returned a non-retryable client error.
    UpstreamRejected,
    /// Upstream failed with a server error or timeout.
    UpstreamUnavailable,
    /// Circuit breaker is open for the upstream.
    CircuitOpen,
    /// Async execution exhausted its poll attempts.
    PollTimeout,
    /// Async job reported a failed status.
    JobFailed,
    /// Invocation was cancelled by the caller.
    Cancelled,
    /// Internal gateway failure.
    Internal,
}

impl ErrorCode {
    /// Returns the fixed retryability classification for the code.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::ExchangeUnreachable
            | Self::UpstreamUnavailable
            | Self::CircuitOpen
            | Self::PollTimeout => true,
            Self::Unauthorized
            | Self::Forbidden
            | Self::InvalidArguments
            | Self::ExchangeRejected
            | Self::ExchangeMalformed
            | Self::UpstreamRejected
            | Self::JobFailed
            | Self::Cancelled
            | Self::Internal => false,
        }
    }

    /// Returns a stable label for audit and metric events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::InvalidArguments => "invalid_arguments",
            Self::ExchangeRejected => "exchange_rejected",
            Self::ExchangeUnreachable => "exchange_unreachable",
            Self::ExchangeMalformed => "exchange_malformed",
            Self::UpstreamRejected => "upstream_rejected",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::CircuitOpen => "circuit_open",
            Self::PollTimeout => "poll_timeout",
            Self::JobFailed => "job_failed",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

/// Structured invocation error.
///
/// # Invariants
/// - `retryable` always equals the code's fixed classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message; never contains raw credentials.
    pub message: String,
    /// Whether the agent may retry the invocation.
    pub retryable: bool,
    /// Suggested retry delay in milliseconds, when known.
    pub retry_after_ms: Option<i64>,
}

impl InvocationError {
    /// Creates an error with the code's fixed retryability.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
            retry_after_ms: None,
        }
    }

    /// Attaches a suggested retry delay.
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after_ms: i64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }
}

// ============================================================================
// SECTION: Result
// ============================================================================

/// Invocation outcome status.
///
/// # Invariants
/// - Variants are stable wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// The tool call completed.
    Completed,
    /// The tool call failed.
    Error,
}

/// Invocation result returned to the agent.
///
/// # Invariants
/// - `result` is present iff status is `Completed`; `error` iff `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Outcome status.
    pub status: InvocationStatus,
    /// Result payload on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Structured error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
}

impl InvocationResult {
    /// Creates a completed result.
    #[must_use]
    pub const fn completed(result: Value) -> Self {
        Self {
            status: InvocationStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub const fn error(error: InvocationError) -> Self {
        Self {
            status: InvocationStatus::Error,
            result: None,
            error: Some(error),
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
    fn retryability_follows_the_fixed_classification() {
        assert!(ErrorCode::CircuitOpen.is_retryable());
        assert!(ErrorCode::UpstreamUnavailable.is_retryable());
        assert!(ErrorCode::ExchangeUnreachable.is_retryable());
        assert!(ErrorCode::PollTimeout.is_retryable());
        assert!(!ErrorCode::ExchangeRejected.is_retryable());
        assert!(!ErrorCode::Forbidden.is_retryable());
        assert!(!ErrorCode::InvalidArguments.is_retryable());
    }

    #[test]
    fn errors_inherit_code_retryability() {
        let error = InvocationError::new(ErrorCode::CircuitOpen, "upstream cooling down")
            .with_retry_after(4_000);
        assert!(error.retryable);
        assert_eq!(error.retry_after_ms, Some(4_000));
    }

    #[test]
    fn results_serialize_without_absent_fields() {
        let completed = InvocationResult::completed(json!({"ok": true}));
        let wire = serde_json::to_string(&completed).unwrap();
        assert!(wire.contains("\"status\":\"completed\""));
        assert!(!wire.contains("\"error\""));
        let failed =
            InvocationResult::error(InvocationError::new(ErrorCode::Forbidden, "not allowed"));
        let wire = serde_json::to_string(&failed).unwrap();
        assert!(wire.contains("\"code\":\"forbidden\""));
        assert!(!wire.contains("\"result\""));
    }
}
