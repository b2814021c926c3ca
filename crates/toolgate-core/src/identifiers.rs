// crates/toolgate-core/src/identifiers.rs
// ============================================================================
// Module: ToolGate Identifiers
// Description: Canonical opaque identifiers for gateway entities.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout ToolGate.
//! Identifiers are opaque and serialize as strings on the wire. No
//! normalization or validation is applied at construction; boundaries that
//! consume identifiers validate them against their own stores.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Defines an opaque string identifier with stable serde and display forms.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier! {
    /// Tool-group identifier granted by access policies.
    GroupId
}

string_identifier! {
    /// Tool identifier unique across the gateway catalog.
    ToolId
}

string_identifier! {
    /// Identifier of the upstream source a tool was cataloged from.
    SourceId
}

string_identifier! {
    /// Access policy identifier owned by the external policy store.
    PolicyId
}

string_identifier! {
    /// Live agent connection identifier used by the fan-out manager.
    ConnectionId
}

/// Canonical upstream identifier derived from a rendered request target.
///
/// # Invariants
/// - Format is `scheme://host:port`, lowercase host, explicit port.
/// - One breaker instance exists per distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamKey(String);

impl UpstreamKey {
    /// Creates an upstream key from scheme, host, and effective port.
    #[must_use]
    pub fn from_parts(scheme: &str, host: &str, port: u16) -> Self {
        Self(format!("{scheme}://{}:{port}", host.to_ascii_lowercase()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
