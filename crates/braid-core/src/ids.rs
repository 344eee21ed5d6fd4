//! Branded string IDs.
//!
//! Event, session, and tool-use identifiers are opaque strings on the wire
//! but distinct types in code, so an `EventId` can never be passed where a
//! `ToolUseId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[doc = $doc:literal])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

branded_id! {
    /// Opaque, session-unique, source-stable event identifier.
    EventId
}

branded_id! {
    /// Conversation session identifier.
    SessionId
}

branded_id! {
    /// Identifier shared by a tool call and its result.
    ToolUseId
}

impl EventId {
    /// Mint a fresh `evt_{uuid-v7}` identifier.
    ///
    /// Normal ingestion carries source-stable ids; this is for events the
    /// host application originates itself (e.g. locally-echoed user input).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("evt_{}", Uuid::now_v7()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
