// crates/toolgate-server/src/bus.rs
// ============================================================================
// Module: Broadcast Event Bus
// Description: In-process implementation of the gateway event bus.
// Purpose: Deliver invalidation events to every subscriber in this process.
// Dependencies: tokio, toolgate-core
// ============================================================================

//! ## Overview
//! The broadcast bus is the in-process [`GatewayEventBus`] implementation.
//! Single-node deployments use it directly; clustered deployments bridge an
//! external pub/sub system into the same interface so invalidation and
//! fan-out behave identically on every gateway instance.
//! Invariants:
//! - Publishing never blocks; subscribers that lag past the channel
//!   capacity observe a lag error and re-resolve from scratch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tokio::sync::broadcast;
use toolgate_core::BusError;
use toolgate_core::GatewayEvent;
use toolgate_core::GatewayEventBus;

// ============================================================================
// SECTION: Broadcast Bus
// ============================================================================

/// In-process broadcast implementation of [`GatewayEventBus`].
pub struct BroadcastBus {
    /// Broadcast sender shared by all publishers.
    sender: broadcast::Sender<GatewayEvent>,
}

impl BroadcastBus {
    /// Creates a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            sender,
        }
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl GatewayEventBus for BroadcastBus {
    fn publish(&self, event: GatewayEvent) -> Result<usize, BusError> {
        // A send error only means no subscriber is currently listening.
        Ok(self.sender.send(event).unwrap_or(0))
    }

    fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
