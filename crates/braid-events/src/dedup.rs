//! Bounded cache of recently-seen event ids.
//!
//! The live transport is at-least-once: after a reconnect it commonly
//! replays frames the store already holds. The cache lets [`upsert`]
//! short-circuit those redundant frames without re-walking the ordering
//! structures. It is owned by its store instance — never process-global —
//! and is reset by `clear_all`.
//!
//! [`upsert`]: crate::store::EventStore::upsert

use std::collections::{HashSet, VecDeque};

use braid_core::ids::EventId;

/// Default capacity: enough to cover a realistic redelivery window.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;

/// Bounded FIFO set of recently-seen event ids.
#[derive(Debug)]
pub struct DedupCache {
    seen: HashSet<EventId>,
    fifo: VecDeque<EventId>,
    capacity: usize,
}

impl DedupCache {
    /// Create a cache holding at most `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity.min(DEFAULT_DEDUP_CAPACITY)),
            fifo: VecDeque::new(),
            capacity,
        }
    }

    /// Record an id as recently seen, evicting the oldest entry when full.
    pub fn note(&mut self, id: EventId) {
        if self.capacity == 0 {
            return;
        }
        if self.seen.insert(id.clone()) {
            self.fifo.push_back(id);
            if self.fifo.len() > self.capacity {
                if let Some(oldest) = self.fifo.pop_front() {
                    let _ = self.seen.remove(&oldest);
                }
            }
        }
    }

    /// Whether an id was recently seen.
    #[must_use]
    pub fn contains(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }

    /// Drop a single id (the event was removed from the store).
    pub fn forget(&mut self, id: &EventId) {
        if self.seen.remove(id) {
            self.fifo.retain(|x| x != id);
        }
    }

    /// Number of cached ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Empty the cache.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.fifo.clear();
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
