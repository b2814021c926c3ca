// crates/toolgate-server/src/correlation.rs
// ============================================================================
// Module: Correlation Policy
// Description: Sanitization and generation for request correlation IDs.
// Purpose: Keep cross-system correlation deterministic and injection-free.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Agents may supply a correlation id header; its value is untrusted and is
//! accepted only when it is a short, plain HTTP token. The gateway always
//! issues its own correlation id per request, built from a boot-scoped
//! random seed plus a monotonic counter, and that id is what audit events
//! and upstream logs key on.
//! Invariants:
//! - Invalid client ids are rejected, never silently repaired.
//! - Server ids are unique within the process lifetime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::RngCore;
use rand::rngs::OsRng;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the client-supplied correlation id.
pub const CLIENT_CORRELATION_HEADER: &str = "x-correlation-id";
/// Header carrying the gateway-issued correlation id.
pub const SERVER_CORRELATION_HEADER: &str = "x-server-correlation-id";
/// Maximum accepted client correlation id length.
pub const MAX_CLIENT_CORRELATION_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Sanitization
// ============================================================================

/// Rejection reason for an invalid client correlation id.
///
/// # Invariants
/// - Variants are stable for audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationIdRejection {
    /// Value was empty after trimming.
    Empty,
    /// Value exceeded the maximum length.
    TooLong,
    /// Value contained a character outside the HTTP token set.
    DisallowedCharacter,
}

impl fmt::Display for CorrelationIdRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Empty => "empty",
            Self::TooLong => "too_long",
            Self::DisallowedCharacter => "disallowed_character",
        };
        f.write_str(label)
    }
}

/// Sanitizes a client correlation id with strict token rules.
///
/// Returns `Ok(None)` when no header value is present; any invalid value
/// is rejected rather than repaired.
///
/// # Errors
///
/// Returns [`CorrelationIdRejection`] naming the violated rule.
pub fn sanitize_client_correlation_id(
    value: Option<&str>,
) -> Result<Option<String>, CorrelationIdRejection> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CorrelationIdRejection::Empty);
    }
    if trimmed.len() > MAX_CLIENT_CORRELATION_ID_LENGTH {
        return Err(CorrelationIdRejection::TooLong);
    }
    if !trimmed.chars().all(is_token_char) {
        return Err(CorrelationIdRejection::DisallowedCharacter);
    }
    Ok(Some(trimmed.to_string()))
}

/// Returns true for characters in the HTTP token set.
const fn is_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|'
                | '~'
        )
}

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Boot-scoped correlation id generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    /// Prefix included in every generated id.
    prefix: &'static str,
    /// Boot-scoped random seed.
    boot_id: u64,
    /// Monotonic counter for ids issued by this process.
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        let mut seed = [0u8; 8];
        OsRng.fill_bytes(&mut seed);
        Self {
            prefix,
            boot_id: u64::from_be_bytes(seed),
            counter: AtomicU64::new(1),
        }
    }

    /// Issues a new server correlation id.
    #[must_use]
    pub fn issue(&self) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:016x}-{:016x}", self.prefix, self.boot_id, sequence)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
