// crates/toolgate-core/src/lib.rs
// ============================================================================
// Module: ToolGate Core Library
// Description: Identity, policy, breaker, and interface contracts for ToolGate.
// Purpose: Define the runtime access-control primitives shared by all crates.
// Dependencies: serde, serde_json, thiserror, dashmap, sha2
// ============================================================================

//! ## Overview
//! ToolGate Core defines the building blocks of the gateway's runtime
//! access-control path: validated identities, claim matchers, access
//! policies, the per-upstream circuit breaker registry, deterministic
//! hashing for cache keys, and the backend-agnostic interfaces the gateway
//! consumes (policy store, shared cache, event bus).
//! Invariants:
//! - Policy evaluation is deterministic and fails closed on missing data.
//! - Access-cache keys derive from the access-relevant claim subset only.
//! - Breaker transitions are monotonic and never skip states.
//!
//! Security posture: claims and policies are untrusted input at this
//! boundary; evaluation must never widen access on error.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod breaker;
pub mod cache;
pub mod claims;
pub mod hashing;
pub mod identifiers;
pub mod identity;
pub mod interfaces;
pub mod policy;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use breaker::BreakerConfig;
pub use breaker::BreakerDecision;
pub use breaker::BreakerRegistry;
pub use breaker::BreakerSnapshot;
pub use breaker::CircuitState;
pub use cache::InMemorySharedCache;
pub use cache::TtlCache;
pub use claims::ClaimMatcher;
pub use claims::ClaimOperator;
pub use claims::claim_at_path;
pub use hashing::AccessKeyMaterial;
pub use hashing::HashError;
pub use hashing::access_cache_key;
pub use hashing::token_fingerprint;
pub use identifiers::ConnectionId;
pub use identifiers::GroupId;
pub use identifiers::PolicyId;
pub use identifiers::SourceId;
pub use identifiers::ToolId;
pub use identifiers::UpstreamKey;
pub use identity::Identity;
pub use interfaces::AccessScope;
pub use interfaces::BusError;
pub use interfaces::GatewayEvent;
pub use interfaces::GatewayEventBus;
pub use interfaces::PolicyStore;
pub use interfaces::PolicyStoreError;
pub use interfaces::SharedCache;
pub use interfaces::SharedCacheError;
pub use policy::AccessPolicy;
pub use policy::evaluate_policies;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;
