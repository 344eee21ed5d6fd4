//! The canonical [`EventStore`] — four coupled indices updated atomically
//! per operation.
//!
//! - `by_id`: unique owner of every event; everything else holds ids.
//! - `order`: global chronological order, sorted by `(createdAt, insertion
//!   sequence)` — ties keep the order in which events were upserted.
//! - `by_session`: the restriction of `order` to one session, same relative
//!   order.
//! - `tool_ix`: per tool-use-id correlation entries, lazily created and
//!   deleted when both sides are absent.
//!
//! Single-writer: all mutation executes serially on one logical task per
//! store instance, so there is no internal locking. Final position and
//! correlation state are computed from event content, so the historical
//! and live sources may race through the single entry point in any order
//! and still converge deterministically.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use braid_core::events::CanonicalEvent;
use braid_core::ids::{EventId, SessionId, ToolUseId};

use crate::dedup::{DEFAULT_DEDUP_CAPACITY, DedupCache};

/// What an [`EventStore::upsert`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upserted {
    /// The id was new; the event was inserted.
    Inserted,
    /// The id existed with a different value; it was replaced.
    Replaced,
    /// The id existed with a structurally equal value; nothing changed.
    Unchanged,
}

/// Tally of an [`EventStore::upsert_batch`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Events inserted under a new id.
    pub inserted: usize,
    /// Events that replaced an existing value.
    pub replaced: usize,
    /// Redundant re-deliveries.
    pub unchanged: usize,
}

/// One correlation entry: which event ids currently represent the call and
/// result sides of a tool invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ToolPairIds {
    pub(crate) call: Option<EventId>,
    pub(crate) result: Option<EventId>,
}

impl ToolPairIds {
    fn is_empty(&self) -> bool {
        self.call.is_none() && self.result.is_none()
    }
}

/// Which side of a correlation entry an event occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ToolSide {
    Call,
    Result,
}

fn tool_side(event: &CanonicalEvent) -> Option<(ToolUseId, ToolSide)> {
    let tool_use_id = event.tool_use_id()?.clone();
    let side = if event.is_tool_call() {
        ToolSide::Call
    } else {
        ToolSide::Result
    };
    Some((tool_use_id, side))
}

type SortKey = (DateTime<Utc>, u64);

/// In-memory projection of one open session view.
///
/// Constructible, caller-owned lifetime (one per open session/workspace) —
/// there is no process-global instance, and the dedup cache dies with its
/// store.
#[derive(Debug)]
pub struct EventStore {
    pub(crate) by_id: HashMap<EventId, CanonicalEvent>,
    pub(crate) order: Vec<EventId>,
    pub(crate) by_session: HashMap<SessionId, Vec<EventId>>,
    pub(crate) tool_ix: HashMap<ToolUseId, ToolPairIds>,
    /// Insertion sequence per id — the tie-break for equal timestamps.
    seq: HashMap<EventId, u64>,
    next_seq: u64,
    dedup: DedupCache,
}

impl EventStore {
    /// Create an empty store with the default dedup-cache capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dedup_capacity(DEFAULT_DEDUP_CAPACITY)
    }

    /// Create an empty store with an explicit dedup-cache capacity.
    #[must_use]
    pub fn with_dedup_capacity(capacity: usize) -> Self {
        Self {
            by_id: HashMap::new(),
            order: Vec::new(),
            by_session: HashMap::new(),
            tool_ix: HashMap::new(),
            seq: HashMap::new(),
            next_seq: 0,
            dedup: DedupCache::new(capacity),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────

    /// Insert or replace one event.
    ///
    /// Replacement is whole-value: the event keeps its logical position
    /// unless its `createdAt` (or session) changed, in which case it is
    /// repositioned per the ordering rule. Structurally identical
    /// re-delivery is a no-op.
    #[instrument(skip(self, event), fields(event_id = %event.id, kind = event.kind()))]
    pub fn upsert(&mut self, event: CanonicalEvent) -> Upserted {
        // Redelivered frames from a reconnecting transport hit this path:
        // recently-seen id plus equal value means nothing to do, without
        // touching the ordering structures.
        if self.dedup.contains(&event.id) && self.by_id.get(&event.id) == Some(&event) {
            return Upserted::Unchanged;
        }

        let outcome = match self.by_id.get(&event.id) {
            Some(existing) if *existing == event => {
                self.dedup.note(event.id.clone());
                Upserted::Unchanged
            }
            Some(_) => {
                self.replace(event);
                Upserted::Replaced
            }
            None => {
                self.insert(event);
                Upserted::Inserted
            }
        };

        #[cfg(debug_assertions)]
        self.check_invariants();

        outcome
    }

    /// Upsert a whole batch.
    ///
    /// Semantically equivalent to sequential [`upsert`](Self::upsert) calls;
    /// tie-break among the batch's own events is the batch's array order.
    /// When every id is new and unique (the historical-load case) the batch
    /// is stable-merged against the existing `order` so a large load stays
    /// O(n log n) instead of O(n²); any collision sends the whole batch down
    /// the per-event path, which assigns insertion sequences in array order
    /// exactly as sequential calls would.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub fn upsert_batch(&mut self, events: Vec<CanonicalEvent>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        // 1. The merge path requires every id to be fresh and unique.
        let mut batch_ids: HashSet<&EventId> = HashSet::with_capacity(events.len());
        let all_fresh = events
            .iter()
            .all(|e| !self.by_id.contains_key(&e.id) && batch_ids.insert(&e.id));
        if !all_fresh {
            for event in events {
                match self.upsert(event) {
                    Upserted::Inserted => outcome.inserted += 1,
                    Upserted::Replaced => outcome.replaced += 1,
                    Upserted::Unchanged => outcome.unchanged += 1,
                }
            }
            debug!(
                inserted = outcome.inserted,
                replaced = outcome.replaced,
                unchanged = outcome.unchanged,
                "batch upserted sequentially"
            );
            return outcome;
        }

        // 2. Sequence the batch in array order, then sort by key.
        for event in &events {
            let _ = self.seq.insert(event.id.clone(), self.next_seq);
            self.next_seq += 1;
        }
        let mut incoming: Vec<(SortKey, EventId)> = events
            .iter()
            .map(|e| {
                let seq = self.seq.get(&e.id).copied().unwrap_or(0);
                ((e.created_at, seq), e.id.clone())
            })
            .collect();
        incoming.sort_by(|a, b| a.0.cmp(&b.0));

        // 3. Move the events into by_id and link their tool sides.
        for event in events {
            if let Some((tool_use_id, side)) = tool_side(&event) {
                self.link_tool(tool_use_id, side, event.id.clone());
            }
            self.dedup.note(event.id.clone());
            let _ = self.by_id.insert(event.id.clone(), event);
            outcome.inserted += 1;
        }

        // 4. Stable merge with the existing order.
        let old = std::mem::take(&mut self.order);
        let mut merged: Vec<EventId> = Vec::with_capacity(old.len() + incoming.len());
        let mut inc = incoming.into_iter().peekable();
        for old_id in old {
            let old_key = self.sort_key(&old_id);
            while inc.peek().is_some_and(|(key, _)| *key < old_key) {
                if let Some((_, id)) = inc.next() {
                    merged.push(id);
                }
            }
            merged.push(old_id);
        }
        merged.extend(inc.map(|(_, id)| id));
        self.order = merged;

        // 5. Rebuild the per-session restriction from the merged order.
        self.by_session.clear();
        for id in &self.order {
            if let Some(event) = self.by_id.get(id) {
                self.by_session
                    .entry(event.session_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }

        #[cfg(debug_assertions)]
        self.check_invariants();

        debug!(
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            unchanged = outcome.unchanged,
            "batch upserted"
        );
        outcome
    }

    /// Remove one event from every index.
    ///
    /// The exact inverse of a non-colliding upsert. Unknown ids are a
    /// no-op, not an error.
    #[instrument(skip(self), fields(event_id = %id))]
    pub fn remove_event(&mut self, id: &EventId) -> bool {
        if !self.by_id.contains_key(id) {
            return false;
        }

        // Indices must be located while by_id still holds the event —
        // sort keys come from it.
        if let Some(idx) = self.index_in_order(id) {
            let _ = self.order.remove(idx);
        }
        let session_id = self.by_id.get(id).map(|e| e.session_id.clone());
        if let Some(sid) = session_id {
            let emptied = if let Some(list) = self.by_session.get_mut(&sid) {
                list.retain(|x| x != id);
                list.is_empty()
            } else {
                false
            };
            if emptied {
                let _ = self.by_session.remove(&sid);
            }
        }

        if let Some(event) = self.by_id.remove(id) {
            if let Some((tool_use_id, side)) = tool_side(&event) {
                self.unlink_tool(&tool_use_id, side, id);
            }
        }
        let _ = self.seq.remove(id);
        self.dedup.forget(id);

        #[cfg(debug_assertions)]
        self.check_invariants();

        true
    }

    /// Empty every index unconditionally (session switch / logout path).
    pub fn clear_all(&mut self) {
        let removed = self.by_id.len();
        self.by_id.clear();
        self.order.clear();
        self.by_session.clear();
        self.tool_ix.clear();
        self.seq.clear();
        self.dedup.clear();
        self.next_seq = 0;
        debug!(removed, "store cleared");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads (immutable snapshot views)
    // ─────────────────────────────────────────────────────────────────────

    /// Number of events held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the store holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Look up one event by id.
    #[must_use]
    pub fn get(&self, id: &EventId) -> Option<&CanonicalEvent> {
        self.by_id.get(id)
    }

    /// Whether an id is present.
    #[must_use]
    pub fn contains(&self, id: &EventId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Global chronological order, as ids.
    #[must_use]
    pub fn order(&self) -> &[EventId] {
        &self.order
    }

    /// All events in global chronological order.
    pub fn events(&self) -> impl Iterator<Item = &CanonicalEvent> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Per-session order, as ids. Empty for unknown sessions.
    #[must_use]
    pub fn session_order(&self, session_id: &SessionId) -> &[EventId] {
        self.by_session
            .get(session_id)
            .map_or(&[], Vec::as_slice)
    }

    /// All events of one session, in chronological order.
    #[must_use]
    pub fn session_events(&self, session_id: &SessionId) -> Vec<&CanonicalEvent> {
        self.session_order(session_id)
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    /// Number of sessions with at least one event.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.by_session.len()
    }

    /// Number of live tool-correlation entries.
    #[must_use]
    pub fn tool_entry_count(&self) -> usize {
        self.tool_ix.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Ordering key of an id: `(createdAt, insertion sequence)`.
    pub(crate) fn sort_key(&self, id: &EventId) -> SortKey {
        let created_at = self
            .by_id
            .get(id)
            .map_or(DateTime::<Utc>::MIN_UTC, |e| e.created_at);
        (created_at, self.seq.get(id).copied().unwrap_or(0))
    }

    fn index_in_order(&self, id: &EventId) -> Option<usize> {
        let key = self.sort_key(id);
        let idx = self.order.partition_point(|x| self.sort_key(x) < key);
        (self.order.get(idx) == Some(id)).then_some(idx)
    }

    fn insert(&mut self, event: CanonicalEvent) {
        let id = event.id.clone();
        let session_id = event.session_id.clone();
        let side = tool_side(&event);

        let _ = self.seq.insert(id.clone(), self.next_seq);
        self.next_seq += 1;
        let _ = self.by_id.insert(id.clone(), event);

        self.insert_into_order(id.clone());
        self.insert_into_session(session_id, id.clone());
        if let Some((tool_use_id, tool_side)) = side {
            self.link_tool(tool_use_id, tool_side, id.clone());
        }
        self.dedup.note(id.clone());
        debug!(event_id = %id, "event inserted");
    }

    fn replace(&mut self, event: CanonicalEvent) {
        let id = event.id.clone();
        let Some(old) = self.by_id.get(&id).cloned() else {
            return self.insert(event);
        };

        // Only a changed createdAt moves the event in the global order; a
        // session change re-files it in by_session at the same position; a
        // value-only replacement touches neither.
        let time_changed = old.created_at != event.created_at;
        let session_changed = old.session_id != event.session_id;

        if time_changed {
            if let Some(idx) = self.index_in_order(&id) {
                let _ = self.order.remove(idx);
            }
        }
        if time_changed || session_changed {
            let emptied = if let Some(list) = self.by_session.get_mut(&old.session_id) {
                list.retain(|x| x != &id);
                list.is_empty()
            } else {
                false
            };
            if emptied {
                let _ = self.by_session.remove(&old.session_id);
            }
        }

        if let Some((tool_use_id, side)) = tool_side(&old) {
            self.unlink_tool(&tool_use_id, side, &id);
        }

        let session_id = event.session_id.clone();
        let side = tool_side(&event);
        let _ = self.by_id.insert(id.clone(), event);

        if time_changed {
            // The event re-arrives at a new position: it gets a fresh
            // sequence so same-timestamp ties still reflect arrival order.
            let _ = self.seq.insert(id.clone(), self.next_seq);
            self.next_seq += 1;
            self.insert_into_order(id.clone());
        }
        if time_changed || session_changed {
            // With an unchanged createdAt the existing sequence keys the
            // event back into the same relative slot.
            self.insert_into_session(session_id, id.clone());
        }

        if let Some((tool_use_id, tool_side)) = side {
            self.link_tool(tool_use_id, tool_side, id.clone());
        }
        self.dedup.note(id.clone());
        debug!(event_id = %id, time_changed, session_changed, "event replaced");
    }

    fn insert_into_order(&mut self, id: EventId) {
        let key = self.sort_key(&id);
        let idx = self.order.partition_point(|x| self.sort_key(x) < key);
        self.order.insert(idx, id);
    }

    fn insert_into_session(&mut self, session_id: SessionId, id: EventId) {
        let key = self.sort_key(&id);
        let idx = self.by_session.get(&session_id).map_or(0, |list| {
            list.partition_point(|x| self.sort_key(x) < key)
        });
        self.by_session.entry(session_id).or_default().insert(idx, id);
    }

    fn link_tool(&mut self, tool_use_id: ToolUseId, side: ToolSide, id: EventId) {
        let entry = self.tool_ix.entry(tool_use_id).or_default();
        match side {
            ToolSide::Call => entry.call = Some(id),
            ToolSide::Result => entry.result = Some(id),
        }
    }

    fn unlink_tool(&mut self, tool_use_id: &ToolUseId, side: ToolSide, id: &EventId) {
        let Some(entry) = self.tool_ix.get_mut(tool_use_id) else {
            return;
        };
        match side {
            ToolSide::Call if entry.call.as_ref() == Some(id) => entry.call = None,
            ToolSide::Result if entry.result.as_ref() == Some(id) => entry.result = None,
            _ => {}
        }
        if entry.is_empty() {
            let _ = self.tool_ix.remove(tool_use_id);
        }
    }

    /// Consistency check run after every mutation in debug builds.
    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        // 1. Bijection between by_id and order.
        assert_eq!(self.order.len(), self.by_id.len());
        for id in &self.order {
            assert!(self.by_id.contains_key(id), "order holds unknown id {id}");
        }

        // 2. order is totally ordered by (createdAt, seq).
        for pair in self.order.windows(2) {
            assert!(
                self.sort_key(&pair[0]) < self.sort_key(&pair[1]),
                "order not sorted at {} / {}",
                pair[0],
                pair[1]
            );
        }

        // 3. by_session is exactly order filtered per session.
        let mut by_session_len = 0;
        for (sid, list) in &self.by_session {
            assert!(!list.is_empty(), "empty session entry {sid}");
            by_session_len += list.len();
            let filtered: Vec<&EventId> = self
                .order
                .iter()
                .filter(|id| self.by_id.get(*id).map(|e| &e.session_id) == Some(sid))
                .collect();
            assert_eq!(filtered, list.iter().collect::<Vec<_>>());
        }
        assert_eq!(by_session_len, self.order.len());

        // 4. tool_ix references only live ids and holds no empty entries.
        for (tid, entry) in &self.tool_ix {
            assert!(!entry.is_empty(), "empty tool entry {tid}");
            for id in entry.call.iter().chain(entry.result.iter()) {
                assert!(self.by_id.contains_key(id), "tool entry {tid} holds dead id");
            }
        }
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
