// crates/toolgate-server/src/metrics.rs
// ============================================================================
// Module: Gateway Metrics
// Description: Observability hooks for gateway requests and latencies.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: toolgate-core, toolgate-access
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for gateway request
//! counters and latency histograms. It is intentionally dependency-light so
//! deployments can plug in Prometheus or OpenTelemetry without redesign.
//! Labels are bounded enums and tool ids; free-form caller input never
//! becomes a label.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use toolgate_access::CacheTier;
use toolgate_core::ToolId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for gateway request histograms.
pub const GATEWAY_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Gateway operation classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOp {
    /// Tool list discovery.
    Discover,
    /// Tool invocation.
    Invoke,
    /// Subscription establishment.
    Subscribe,
    /// Subscription heartbeat.
    Heartbeat,
}

impl GatewayOp {
    /// Returns a stable label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Invoke => "invoke",
            Self::Subscribe => "subscribe",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Gateway request metric event payload.
///
/// # Invariants
/// - Optional fields are `None` when the metadata is unavailable.
#[derive(Debug, Clone)]
pub struct RequestMetric {
    /// Operation classification.
    pub op: GatewayOp,
    /// Target tool for invocations.
    pub tool: Option<ToolId>,
    /// Whether the request succeeded.
    pub ok: bool,
    /// Stable error code label when the request failed.
    pub error_code: Option<&'static str>,
    /// Cache tier that served access resolution, when resolved.
    pub tier: Option<CacheTier>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for gateway requests and latencies.
pub trait GatewayMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, metric: RequestMetric);
    /// Records a latency observation for the request.
    fn record_latency(&self, metric: RequestMetric, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_request(&self, _metric: RequestMetric) {}

    fn record_latency(&self, _metric: RequestMetric, _latency: Duration) {}
}
