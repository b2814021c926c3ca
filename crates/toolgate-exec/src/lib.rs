// crates/toolgate-exec/src/lib.rs
// ============================================================================
// Module: ToolGate Exec Library
// Description: Declarative request rendering and resilient tool execution.
// Purpose: Turn manifest entries plus arguments into guarded upstream calls.
// Dependencies: jsonschema, jsonpath_lib, reqwest, tokio-util, toolgate-*
// ============================================================================

//! ## Overview
//! Execution is a strict sequence: validate arguments against the tool's
//! input schema, exchange the caller credential for the profile's audience,
//! render the declarative request templates, consult the per-upstream
//! circuit breaker, then perform the call. Synchronous tools make one HTTP
//! request; asynchronous tools trigger a job and poll its status with
//! bounded exponential backoff. Every step is cancellable and every failure
//! maps onto the stable invocation error taxonomy.
//! Invariants:
//! - No network call happens before schema validation passes.
//! - Rendered requests carry the exchanged credential, never the caller's.
//! - Poll loops are bounded by `max_attempts` without exception.
//!
//! Security posture: arguments and upstream responses are untrusted input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod executor;
pub mod render;
pub mod upstream;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use executor::ExecutorConfig;
pub use executor::ToolExecutor;
pub use render::RenderError;
pub use render::RenderedRequest;
pub use render::render_request;
pub use render::render_status_url;
pub use upstream::ReqwestTransport;
pub use upstream::TransportError;
pub use upstream::UpstreamPolicy;
pub use upstream::UpstreamResponse;
pub use upstream::UpstreamTransport;
