// crates/toolgate-cli/src/serve_policy.rs
// ============================================================================
// Module: Serve Bind Policy
// Description: Loopback-only bind enforcement with explicit override.
// Purpose: Keep default deployments from listening publicly by accident.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The gateway refuses to bind a non-loopback address unless the operator
//! sets the override environment variable to `1` or `true`. The check runs
//! before any socket is opened, so a misconfigured bind fails fast instead
//! of serving briefly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;

use thiserror::Error;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Environment variable allowing non-loopback binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "TOOLGATE_ALLOW_NON_LOOPBACK";

/// Bind policy violations.
///
/// # Invariants
/// - Variants are stable for operator-facing messages.
#[derive(Debug, Error)]
pub enum BindPolicyError {
    /// Non-loopback bind without the explicit override.
    #[error(
        "refusing non-loopback bind {0}; set {ALLOW_NON_LOOPBACK_ENV}=1 to serve beyond loopback"
    )]
    NonLoopback(SocketAddr),
}

/// Enforces the loopback-only bind policy.
///
/// # Errors
///
/// Returns [`BindPolicyError::NonLoopback`] for non-loopback binds without
/// the environment override.
pub fn enforce_local_only(bind: SocketAddr) -> Result<(), BindPolicyError> {
    if bind.ip().is_loopback() || override_enabled(std::env::var(ALLOW_NON_LOOPBACK_ENV).ok()) {
        Ok(())
    } else {
        Err(BindPolicyError::NonLoopback(bind))
    }
}

/// Interprets the override variable; only `1` and `true` enable it.
fn override_enabled(value: Option<String>) -> bool {
    matches!(value.as_deref().map(str::trim), Some("1" | "true"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
