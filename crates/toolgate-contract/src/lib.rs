// crates/toolgate-contract/src/lib.rs
// ============================================================================
// Module: ToolGate Contract Library
// Description: Wire types for tool manifests, execution profiles, and invocations.
// Purpose: Provide the stable agent-facing and store-facing data contracts.
// Dependencies: serde, serde_json, thiserror, toolgate-core
// ============================================================================

//! ## Overview
//! The contract crate defines every type that crosses a ToolGate process
//! boundary: tool records and group specifications read from the tool
//! store, the merged manifest entries pushed to agents, declarative
//! execution profiles, invocation requests and results, and the catalog
//! messages delivered over the subscription channel.
//! Invariants:
//! - Wire shapes are stable; variants and field names are part of the
//!   protocol and never repurposed.
//! - Manifest entries are unique per tool id; group membership accumulates.
//!
//! Security posture: all inbound contract payloads are untrusted until
//! validated at the consuming boundary.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod invocation;
pub mod manifest;
pub mod profile;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::CatalogMessage;
pub use invocation::ErrorCode;
pub use invocation::InvocationError;
pub use invocation::InvocationRequest;
pub use invocation::InvocationResult;
pub use invocation::InvocationStatus;
pub use manifest::GroupSpec;
pub use manifest::ToolManifestEntry;
pub use manifest::ToolRecord;
pub use manifest::ToolSelector;
pub use profile::ExecutionMode;
pub use profile::ExecutionProfile;
pub use profile::HttpMethod;
pub use profile::PollConfig;
pub use profile::ProfileError;
