//! Error taxonomy for the normalization boundary.
//!
//! Everything here is local and recoverable: a rejected record is dropped
//! and the rest of its batch/stream continues to process. Nothing in the
//! store or projector raises for data-shape reasons.

use thiserror::Error;

/// A raw record failed normalization.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field (`id`, `createdAt`, `kind`, ...) is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but its value is unusable.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField {
        /// Offending field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The `kind` discriminator names no known event variant.
    #[error("unknown event kind '{0}'")]
    UnknownKind(String),

    /// The kind-specific payload could not be decoded.
    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
