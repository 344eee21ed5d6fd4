//! # braid-events
//!
//! The canonical event store for one open session view.
//!
//! A single ingestion path — [`normalize`](normalize::normalize) followed by
//! [`EventStore::upsert`](store::EventStore::upsert) — folds both the
//! historical batch and the live push stream into four coupled indices:
//! `by_id`, the global chronological `order`, the per-session restriction of
//! that order, and the `tool_ix` correlation map. Every operation updates the
//! four as one atomic unit.
//!
//! The store is a single-writer structure (one logical task per instance, no
//! internal locking); reads borrow immutable snapshots and recompute rather
//! than cache. It holds no durable state: the whole thing is reconstructible
//! by re-running the historical load.

#![deny(unsafe_code)]

pub mod dedup;
pub mod normalize;
pub mod select;
pub mod store;

pub use dedup::{DEFAULT_DEDUP_CAPACITY, DedupCache};
pub use normalize::{BatchFailure, NormalizedBatch, normalize, normalize_batch};
pub use select::ToolPair;
pub use store::{BatchOutcome, EventStore, Upserted};
