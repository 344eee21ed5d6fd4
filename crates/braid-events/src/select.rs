//! Read-side selectors over the tool-correlation index.
//!
//! Pure queries: they borrow from the store and recompute on every call
//! rather than caching derived state.

use braid_core::events::CanonicalEvent;
use braid_core::ids::ToolUseId;

use crate::store::EventStore;

/// Both sides of one tool invocation, either of which may be absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToolPair<'a> {
    /// The `tool_call` event, if ingested.
    pub call: Option<&'a CanonicalEvent>,
    /// The `tool_result` event, if ingested.
    pub result: Option<&'a CanonicalEvent>,
}

impl ToolPair<'_> {
    /// Whether both sides have arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.call.is_some() && self.result.is_some()
    }
}

impl EventStore {
    /// Resolve the call/result pair for one tool-use id. Unknown ids yield
    /// an empty pair.
    #[must_use]
    pub fn get_tool_pair(&self, tool_use_id: &ToolUseId) -> ToolPair<'_> {
        let Some(entry) = self.tool_ix.get(tool_use_id) else {
            return ToolPair::default();
        };
        ToolPair {
            call: entry.call.as_ref().and_then(|id| self.by_id.get(id)),
            result: entry.result.as_ref().and_then(|id| self.by_id.get(id)),
        }
    }

    /// All tool calls whose result has not (yet) arrived, in global
    /// chronological order. An in-flight tool is indistinguishable from an
    /// abandoned one here; callers decide how to present the gap.
    #[must_use]
    pub fn orphaned_tool_calls(&self) -> Vec<&CanonicalEvent> {
        let mut orphans: Vec<&CanonicalEvent> = self
            .tool_ix
            .values()
            .filter(|entry| entry.result.is_none())
            .filter_map(|entry| entry.call.as_ref())
            .filter_map(|id| self.by_id.get(id))
            .collect();
        orphans.sort_by_key(|event| self.sort_key(&event.id));
        orphans
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
