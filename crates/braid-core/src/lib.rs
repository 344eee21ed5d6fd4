//! # braid-core
//!
//! Foundation types for the Braid session-view engine.
//!
//! This crate provides the shared vocabulary the other Braid crates depend on:
//!
//! - **Branded IDs**: [`ids::EventId`], [`ids::SessionId`], [`ids::ToolUseId`] as newtypes
//! - **Canonical events**: [`events::CanonicalEvent`] — the normalized, tagged-union
//!   representation of one unit of session activity
//! - **Content blocks**: [`events::ContentNode`] for message sub-parts
//! - **Streaming state**: [`events::StreamState`] (`Streaming` → terminal `Finalized`)
//! - **Errors**: [`errors::ValidationError`] via `thiserror`
//! - **Logging**: [`logging::init`] tracing bootstrap
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `braid-events` and `braid-timeline`.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod text;
