// crates/toolgate-server/src/lib.rs
// ============================================================================
// Module: ToolGate Server Library
// Description: Gateway assembly, fan-out, and the agent-facing HTTP surface.
// Purpose: Wire validator, resolvers, exchanger, and executor into a server.
// Dependencies: axum, dashmap, tokio, toolgate-*
// ============================================================================

//! ## Overview
//! The server crate assembles the gateway runtime: the [`GatewayService`]
//! drives discovery and invocation end to end, the
//! [`SubscriptionRegistry`] tracks live agent connections and fans catalog
//! updates out to them, the broadcast [`BroadcastBus`] carries policy and
//! group change events to every instance, and the axum router exposes the
//! inbound surface (tool list, invocation, SSE subscription, heartbeat).
//! Invariants:
//! - Every inbound call is authenticated before any other work happens.
//! - Authorization failures surface as forbidden; they are never silently
//!   substituted with a narrower result.
//!
//! Security posture: all inbound payloads and headers are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod bus;
pub mod correlation;
pub mod http;
pub mod metrics;
pub mod service;
pub mod subscriptions;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditAction;
pub use audit::AuditEvent;
pub use audit::AuditOutcome;
pub use audit::GatewayAuditSink;
pub use audit::NoopAuditSink;
pub use audit::TracingAuditSink;
pub use bus::BroadcastBus;
pub use correlation::CLIENT_CORRELATION_HEADER;
pub use correlation::CorrelationIdGenerator;
pub use correlation::CorrelationIdRejection;
pub use correlation::SERVER_CORRELATION_HEADER;
pub use correlation::sanitize_client_correlation_id;
pub use http::router;
pub use metrics::GatewayMetrics;
pub use metrics::GatewayOp;
pub use metrics::NoopMetrics;
pub use metrics::RequestMetric;
pub use service::GatewayError;
pub use service::GatewayOptions;
pub use service::GatewayService;
pub use subscriptions::SubscriptionConfig;
pub use subscriptions::SubscriptionRegistry;
