// crates/toolgate-core/src/time.rs
// ============================================================================
// Module: ToolGate Time Model
// Description: Canonical timestamps and the clock seam for TTL decisions.
// Purpose: Keep cache expiry and breaker windows deterministic and testable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! ToolGate components never read wall-clock time directly. Every expiry
//! decision (identity cache, access tiers, exchanged credentials, breaker
//! windows) goes through a [`Clock`] supplied at construction, so tests can
//! drive time explicitly and replay stays deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by clocks or callers; no validation is
///   performed and monotonicity is a caller responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from unix epoch seconds.
    #[must_use]
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp as unix epoch seconds, truncating sub-second parts.
    #[must_use]
    pub const fn as_unix_secs(self) -> i64 {
        self.0.div_euclid(1_000)
    }

    /// Returns this timestamp advanced by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp advanced by the given number of seconds.
    #[must_use]
    pub const fn plus_secs(self, secs: i64) -> Self {
        self.plus_millis(secs.saturating_mul(1_000))
    }

    /// Returns the milliseconds elapsed from `earlier` to `self` (zero when earlier is later).
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 { 0 } else { delta }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ============================================================================
// SECTION: Clock Seam
// ============================================================================

/// Time source consulted for every expiry decision.
///
/// Implementations must be cheap and safe to call from concurrent contexts.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock backed [`Clock`] used by production deployments.
///
/// # Invariants
/// - Clock skew before the unix epoch saturates to zero rather than panicking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        let clamped = i64::try_from(millis).unwrap_or(i64::MAX);
        Timestamp::from_unix_millis(clamped)
    }
}

/// Manually driven [`Clock`] for deterministic tests and replay tooling.
///
/// # Invariants
/// - Time only moves when `set` or `advance_*` is called.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time in unix epoch milliseconds.
    now_millis: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock starting at the given timestamp.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_millis: AtomicI64::new(start.as_unix_millis()),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        self.now_millis.store(now.as_unix_millis(), Ordering::SeqCst);
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.now_millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Advances the clock by the given number of seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.advance_millis(secs.saturating_mul(1_000));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_deterministically() {
        let clock = ManualClock::new(Timestamp::from_unix_secs(100));
        assert_eq!(clock.now().as_unix_secs(), 100);
        clock.advance_secs(61);
        assert_eq!(clock.now().as_unix_secs(), 161);
    }

    #[test]
    fn millis_since_clamps_negative_deltas_to_zero() {
        let earlier = Timestamp::from_unix_millis(5_000);
        let later = Timestamp::from_unix_millis(7_500);
        assert_eq!(later.millis_since(earlier), 2_500);
        assert_eq!(earlier.millis_since(later), 0);
    }
}
