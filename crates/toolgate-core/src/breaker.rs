// crates/toolgate-core/src/breaker.rs
// ============================================================================
// Module: Circuit Breaker Registry
// Description: Per-upstream failure state machine guarding outbound calls.
// Purpose: Short-circuit calls to failing upstreams and probe recovery.
// Dependencies: dashmap, serde, tracing, crate::identifiers, crate::time
// ============================================================================

//! ## Overview
//! One breaker exists per canonical upstream key. The state machine is
//! Closed → Open → HalfOpen → Closed: failures are counted in a rolling
//! window while closed; reaching the threshold opens the circuit; after the
//! recovery timeout a bounded number of trial calls probe the upstream; the
//! configured number of consecutive successes closes the circuit again and
//! any probe failure reopens it.
//! Invariants:
//! - Transitions never skip states.
//! - An open circuit denies without any network side effects.
//! - The registry is bounded by idle-entry eviction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::UpstreamKey;
use crate::time::Clock;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Breaker thresholds and timing.
///
/// # Invariants
/// - All thresholds are non-zero; config validation enforces this upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures within the window that open the circuit.
    pub failure_threshold: u32,
    /// Rolling failure window in milliseconds.
    pub failure_window_ms: i64,
    /// Cooldown before an open circuit admits trial calls, in milliseconds.
    pub recovery_timeout_ms: i64,
    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,
    /// Idle period after which an upstream entry is evicted, in milliseconds.
    pub idle_eviction_ms: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_ms: 30_000,
            recovery_timeout_ms: 30_000,
            success_threshold: 2,
            idle_eviction_ms: 900_000,
        }
    }
}

// ============================================================================
// SECTION: State Machine
// ============================================================================

/// Breaker state for one upstream.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls short-circuit without reaching the network.
    Open,
    /// A bounded number of trial calls probe the upstream.
    HalfOpen,
}

impl CircuitState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Admission decision for one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// The call may proceed.
    Allow,
    /// The circuit is open; retry after the suggested delay.
    Deny {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: i64,
    },
}

/// Read-only view of one breaker entry.
///
/// # Invariants
/// - Snapshot values are consistent for a single observation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Failures currently inside the rolling window.
    pub window_failures: u32,
    /// When the current state was entered.
    pub state_entered_at: Timestamp,
}

/// Mutable breaker bookkeeping for one upstream.
///
/// # Invariants
/// - `failure_times` only holds timestamps inside the rolling window.
/// - `opened_at` is `Some` exactly while the state is `Open`.
#[derive(Debug)]
struct BreakerCore {
    /// Current state.
    state: CircuitState,
    /// Failure timestamps inside the rolling window (closed state only).
    failure_times: Vec<Timestamp>,
    /// Consecutive successful probes while half-open.
    half_open_successes: u32,
    /// Trial calls admitted and not yet resolved while half-open.
    half_open_in_flight: u32,
    /// When the circuit last opened.
    opened_at: Option<Timestamp>,
    /// When the current state was entered.
    state_entered_at: Timestamp,
    /// Last admission or outcome activity, for idle eviction.
    last_activity: Timestamp,
}

impl BreakerCore {
    /// Creates a closed breaker.
    fn new(now: Timestamp) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_times: Vec::new(),
            half_open_successes: 0,
            half_open_in_flight: 0,
            opened_at: None,
            state_entered_at: now,
            last_activity: now,
        }
    }

    /// Moves to a new state and resets per-state bookkeeping.
    fn transition_to(&mut self, new_state: CircuitState, now: Timestamp) {
        self.state = new_state;
        self.state_entered_at = now;
        match new_state {
            CircuitState::Closed => {
                self.failure_times.clear();
                self.half_open_successes = 0;
                self.half_open_in_flight = 0;
                self.opened_at = None;
            }
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.half_open_successes = 0;
                self.half_open_in_flight = 0;
            }
            CircuitState::HalfOpen => {
                self.half_open_successes = 0;
                self.half_open_in_flight = 0;
            }
        }
    }

    /// Drops failure timestamps that fell out of the rolling window.
    fn prune_window(&mut self, now: Timestamp, window_ms: i64) {
        self.failure_times.retain(|stamp| now.millis_since(*stamp) < window_ms);
    }

    /// Decides whether one call may proceed.
    fn check(&mut self, config: &BreakerConfig, now: Timestamp) -> BreakerDecision {
        self.last_activity = now;
        match self.state {
            CircuitState::Closed => BreakerDecision::Allow,
            CircuitState::Open => {
                let opened_at = self.opened_at.unwrap_or(self.state_entered_at);
                let elapsed = now.millis_since(opened_at);
                if elapsed >= config.recovery_timeout_ms {
                    tracing::info!(elapsed_ms = elapsed, "breaker cooldown elapsed, half-open");
                    self.transition_to(CircuitState::HalfOpen, now);
                    self.half_open_in_flight = 1;
                    BreakerDecision::Allow
                } else {
                    BreakerDecision::Deny {
                        retry_after_ms: config.recovery_timeout_ms.saturating_sub(elapsed),
                    }
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_in_flight < config.success_threshold {
                    self.half_open_in_flight += 1;
                    BreakerDecision::Allow
                } else {
                    BreakerDecision::Deny {
                        retry_after_ms: config.recovery_timeout_ms,
                    }
                }
            }
        }
    }

    /// Records a successful call outcome.
    fn record_success(&mut self, config: &BreakerConfig, now: Timestamp) {
        self.last_activity = now;
        match self.state {
            CircuitState::Closed => {
                self.failure_times.clear();
            }
            CircuitState::HalfOpen => {
                self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
                self.half_open_successes += 1;
                if self.half_open_successes >= config.success_threshold {
                    tracing::info!(
                        probes = self.half_open_successes,
                        "breaker recovered, closing circuit"
                    );
                    self.transition_to(CircuitState::Closed, now);
                }
            }
            CircuitState::Open => {
                // Late responses after the circuit opened carry no signal.
            }
        }
    }

    /// Records a failed call outcome.
    fn record_failure(&mut self, config: &BreakerConfig, now: Timestamp) {
        self.last_activity = now;
        match self.state {
            CircuitState::Closed => {
                self.prune_window(now, config.failure_window_ms);
                self.failure_times.push(now);
                let window_failures = u32::try_from(self.failure_times.len()).unwrap_or(u32::MAX);
                if window_failures >= config.failure_threshold {
                    tracing::warn!(
                        failures = window_failures,
                        threshold = config.failure_threshold,
                        "breaker tripped, opening circuit"
                    );
                    self.transition_to(CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("probe failure while half-open, reopening circuit");
                self.transition_to(CircuitState::Open, now);
            }
            CircuitState::Open => {
                // Already open; nothing further to count.
            }
        }
    }

    /// Returns a read-only snapshot.
    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            window_failures: u32::try_from(self.failure_times.len()).unwrap_or(u32::MAX),
            state_entered_at: self.state_entered_at,
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Per-upstream breaker registry.
///
/// # Invariants
/// - Entries are created lazily on first admission check.
/// - No lock spans more than one upstream key.
pub struct BreakerRegistry {
    /// Breaker state keyed by canonical upstream identifier.
    entries: DashMap<UpstreamKey, Arc<Mutex<BreakerCore>>>,
    /// Shared thresholds and timing.
    config: BreakerConfig,
    /// Time source for window and cooldown decisions.
    clock: Arc<dyn Clock>,
}

impl BreakerRegistry {
    /// Creates a registry with the given configuration and clock.
    #[must_use]
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
        }
    }

    /// Decides whether a call to the upstream may proceed.
    #[must_use]
    pub fn check(&self, upstream: &UpstreamKey) -> BreakerDecision {
        let now = self.clock.now();
        let entry = self.entry(upstream, now);
        let mut core = entry.lock().unwrap_or_else(PoisonError::into_inner);
        core.check(&self.config, now)
    }

    /// Records a successful call outcome for the upstream.
    pub fn record_success(&self, upstream: &UpstreamKey) {
        let now = self.clock.now();
        let entry = self.entry(upstream, now);
        let mut core = entry.lock().unwrap_or_else(PoisonError::into_inner);
        core.record_success(&self.config, now);
    }

    /// Records a failed call outcome for the upstream.
    pub fn record_failure(&self, upstream: &UpstreamKey) {
        let now = self.clock.now();
        let entry = self.entry(upstream, now);
        let mut core = entry.lock().unwrap_or_else(PoisonError::into_inner);
        core.record_failure(&self.config, now);
    }

    /// Returns a snapshot of one upstream entry when it exists.
    #[must_use]
    pub fn snapshot(&self, upstream: &UpstreamKey) -> Option<BreakerSnapshot> {
        self.entries.get(upstream).map(|entry| {
            let core = entry.lock().unwrap_or_else(PoisonError::into_inner);
            core.snapshot()
        })
    }

    /// Evicts entries idle longer than the configured period.
    ///
    /// Open circuits are retained even when idle so a recovering upstream
    /// is still probed instead of silently reset.
    pub fn evict_idle(&self) {
        let now = self.clock.now();
        let idle_ms = self.config.idle_eviction_ms;
        self.entries.retain(|_, entry| {
            let core = entry.lock().unwrap_or_else(PoisonError::into_inner);
            core.state != CircuitState::Closed || now.millis_since(core.last_activity) < idle_ms
        });
    }

    /// Returns the number of tracked upstreams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no upstream is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetches or lazily creates the entry for an upstream.
    fn entry(&self, upstream: &UpstreamKey, now: Timestamp) -> Arc<Mutex<BreakerCore>> {
        self.entries
            .entry(upstream.clone())
            .or_insert_with(|| Arc::new(Mutex::new(BreakerCore::new(now))))
            .clone()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
