// crates/toolgate-server/src/audit.rs
// ============================================================================
// Module: Gateway Audit
// Description: Structured audit events for every inbound gateway action.
// Purpose: Record who did what with which outcome, without token material.
// Dependencies: toolgate-core, tracing
// ============================================================================

//! ## Overview
//! Every inbound action emits one audit event: the action, the caller (as
//! subject and token fingerprint, never the raw credential), the target
//! tool when applicable, the outcome, and the correlation ids. The sink is
//! a trait so managed deployments can forward events to their own audit
//! pipeline; the defaults are a no-op sink and a tracing-backed sink.
//! Invariants:
//! - Events never contain raw credentials or argument payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use toolgate_core::ToolId;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Audited gateway action.
///
/// # Invariants
/// - Variants are stable for audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Tool list discovery.
    Discover,
    /// Tool invocation.
    Invoke,
    /// Subscription establishment.
    Subscribe,
    /// Subscription heartbeat.
    Heartbeat,
    /// Invalidation event application.
    Invalidate,
}

impl AuditAction {
    /// Returns a stable label for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Invoke => "invoke",
            Self::Subscribe => "subscribe",
            Self::Heartbeat => "heartbeat",
            Self::Invalidate => "invalidate",
        }
    }
}

/// Audited outcome.
///
/// # Invariants
/// - Variants are stable for audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    /// The action succeeded.
    Ok,
    /// The action was denied by authentication or authorization.
    Denied,
    /// The action failed.
    Error,
}

impl AuditOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

/// One audit record.
///
/// # Invariants
/// - `token` is a fingerprint, never raw credential material.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Gateway-issued correlation id.
    pub server_correlation_id: String,
    /// Sanitized client correlation id when supplied.
    pub unsafe_client_correlation_id: Option<String>,
    /// Token fingerprint of the caller credential.
    pub token: String,
    /// Validated subject when authentication succeeded.
    pub subject: Option<String>,
    /// Audited action.
    pub action: AuditAction,
    /// Target tool for invocations.
    pub tool: Option<ToolId>,
    /// Outcome classification.
    pub outcome: AuditOutcome,
    /// Stable error code label when the action failed.
    pub error_code: Option<&'static str>,
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Audit sink for gateway actions.
pub trait GatewayAuditSink: Send + Sync {
    /// Records one audit event.
    fn record(&self, event: AuditEvent);
}

/// No-op audit sink.
///
/// # Invariants
/// - Events are intentionally discarded.
pub struct NoopAuditSink;

impl GatewayAuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Tracing-backed audit sink emitting structured log events.
pub struct TracingAuditSink;

impl GatewayAuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "toolgate::audit",
            correlation = %event.server_correlation_id,
            client_correlation = event.unsafe_client_correlation_id.as_deref(),
            token = %event.token,
            subject = event.subject.as_deref(),
            action = event.action.as_str(),
            tool = event.tool.as_ref().map(ToolId::as_str),
            outcome = event.outcome.as_str(),
            error_code = event.error_code,
            "gateway action"
        );
    }
}
