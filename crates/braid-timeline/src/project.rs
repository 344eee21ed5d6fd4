//! The projection pipeline: canonical events in, display-ready timeline out.
//!
//! Every stage is pure and allocates a fresh output — nothing here caches,
//! locks, or mutates its input, so stages are safe to call concurrently
//! with store writers. Stage order in [`project`]:
//!
//! 1. [`flatten`] — canonical events to timeline entries.
//! 2. [`pair_tool_events`] — merge matched call/result pairs.
//! 3. [`consolidate_chunks`] — fold streamed fragments into text.
//! 4. [`group_think_blocks`] — collapse scratchpad-tool runs.
//!
//! None of the stages panic on malformed or partial input; unclassifiable
//! input becomes a placeholder text entry rather than disappearing.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use braid_core::events::{CanonicalEvent, CheckpointPhase, ContentNode, EventPayload, Role};
use braid_core::ids::{EventId, ToolUseId};

use crate::types::{
    ChunkEvent, TextEvent, ThinkGroupEvent, TimelineEvent, ToolCallEvent, ToolInteractionEvent,
    ToolResultEvent,
};

/// Projection knobs.
#[derive(Clone, Debug)]
pub struct ProjectorOptions {
    /// Name of the reasoning/scratchpad tool whose consecutive calls are
    /// collapsed into think groups.
    pub think_tool: String,
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self {
            think_tool: "think".into(),
        }
    }
}

/// Run the full pipeline over an ordered event sequence.
#[must_use]
pub fn project(events: &[CanonicalEvent], options: &ProjectorOptions) -> Vec<TimelineEvent> {
    let timeline = group_think_blocks(
        consolidate_chunks(pair_tool_events(flatten(events))),
        options,
    );
    debug!(
        events = events.len(),
        entries = timeline.len(),
        "timeline projected"
    );
    timeline
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage 1: flatten
// ─────────────────────────────────────────────────────────────────────────────

/// Flatten canonical events into standalone timeline entries.
///
/// Message text parts become `text` entries, or `chunk` entries while the
/// message is still streaming (the chunk's `messageId` is the event id, so
/// later consolidation can reassemble the message). Embedded tool parts
/// become standalone call/result entries. Checkpoints map to a placeholder
/// text entry so they stay auditable in the output.
#[must_use]
pub fn flatten(events: &[CanonicalEvent]) -> Vec<TimelineEvent> {
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        flatten_event(event, &mut out);
    }
    out
}

fn flatten_event(event: &CanonicalEvent, out: &mut Vec<TimelineEvent>) {
    match &event.payload {
        EventPayload::Message { content } => {
            for node in content {
                out.push(flatten_node(event, node));
            }
        }
        EventPayload::ToolCall {
            tool_use_id,
            name,
            args,
        } => out.push(TimelineEvent::ToolCall(ToolCallEvent {
            id: event.id.clone(),
            tool_use_id: tool_use_id.clone(),
            name: name.clone(),
            args: args.clone(),
            created_at: event.created_at,
        })),
        EventPayload::ToolResult {
            tool_use_id,
            result,
            is_error,
        } => out.push(TimelineEvent::ToolResult(ToolResultEvent {
            id: event.id.clone(),
            tool_use_id: tool_use_id.clone(),
            name: None,
            result: result.clone(),
            is_error: *is_error,
            created_at: event.created_at,
        })),
        EventPayload::Checkpoint {
            phase, reference, ..
        } => {
            let phase = match phase {
                CheckpointPhase::Start => "start",
                CheckpointPhase::End => "end",
            };
            let text = match reference {
                Some(reference) => format!("[checkpoint {phase}: {reference}]"),
                None => format!("[checkpoint {phase}]"),
            };
            out.push(placeholder(event.id.clone(), event.created_at, text));
        }
    }
}

fn flatten_node(event: &CanonicalEvent, node: &ContentNode) -> TimelineEvent {
    match node {
        ContentNode::Text { text } => {
            if event.stream_state().is_open() {
                TimelineEvent::Chunk(ChunkEvent {
                    id: event.id.clone(),
                    message_id: event.id.clone(),
                    role: event.role,
                    delta: text.clone(),
                    streaming: true,
                    created_at: event.created_at,
                })
            } else {
                TimelineEvent::Text(TextEvent {
                    id: event.id.clone(),
                    role: event.role,
                    text: text.clone(),
                    created_at: event.created_at,
                    streaming: false,
                })
            }
        }
        ContentNode::ToolUse { id, name, input } => TimelineEvent::ToolCall(ToolCallEvent {
            id: event.id.clone(),
            tool_use_id: id.clone(),
            name: name.clone(),
            args: input.clone(),
            created_at: event.created_at,
        }),
        ContentNode::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => TimelineEvent::ToolResult(ToolResultEvent {
            id: event.id.clone(),
            tool_use_id: tool_use_id.clone(),
            name: None,
            result: content.clone(),
            is_error: *is_error,
            created_at: event.created_at,
        }),
    }
}

fn placeholder(id: EventId, created_at: DateTime<Utc>, text: String) -> TimelineEvent {
    TimelineEvent::Text(TextEvent {
        id,
        role: Role::System,
        text,
        created_at,
        streaming: false,
    })
}

/// Flatten a raw ordered list of chat messages (as loose JSON) into
/// timeline entries.
///
/// Tolerant by contract: missing fields get defaults, unrecognized content
/// parts become placeholder text entries, and nothing here returns an
/// error or panics.
#[must_use]
pub fn flatten_messages(messages: &[Value]) -> Vec<TimelineEvent> {
    let mut out = Vec::new();
    for (i, message) in messages.iter().enumerate() {
        let id = message
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| EventId::from(format!("msg_{i}")), EventId::from);
        let role = match message.get("role").and_then(Value::as_str) {
            Some("assistant") => Role::Assistant,
            Some("system") => Role::System,
            _ => Role::User,
        };
        let created_at = message
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let streaming = message
            .get("partial")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let Some(content) = message.get("content") else {
            continue;
        };
        match content {
            Value::String(text) => out.push(TimelineEvent::Text(TextEvent {
                id: id.clone(),
                role,
                text: text.clone(),
                created_at,
                streaming,
            })),
            Value::Array(parts) => {
                for part in parts {
                    out.push(flatten_raw_part(part, &id, role, created_at, streaming));
                }
            }
            other => out.push(placeholder(
                id.clone(),
                created_at,
                format!("[unrecognized content: {other}]"),
            )),
        }
    }
    out
}

fn flatten_raw_part(
    part: &Value,
    id: &EventId,
    role: Role,
    created_at: DateTime<Utc>,
    streaming: bool,
) -> TimelineEvent {
    let part_type = part.get("type").and_then(Value::as_str).unwrap_or("");
    match part_type {
        "text" => {
            let text = part
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            if streaming {
                TimelineEvent::Chunk(ChunkEvent {
                    id: id.clone(),
                    message_id: id.clone(),
                    role,
                    delta: text,
                    streaming: true,
                    created_at,
                })
            } else {
                TimelineEvent::Text(TextEvent {
                    id: id.clone(),
                    role,
                    text,
                    created_at,
                    streaming: false,
                })
            }
        }
        "tool_use" => TimelineEvent::ToolCall(ToolCallEvent {
            id: id.clone(),
            tool_use_id: ToolUseId::from(
                part.get("id").and_then(Value::as_str).unwrap_or_default(),
            ),
            name: part
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            args: part.get("input").cloned().unwrap_or(Value::Null),
            created_at,
        }),
        "tool_result" => TimelineEvent::ToolResult(ToolResultEvent {
            id: id.clone(),
            tool_use_id: ToolUseId::from(
                part.get("toolUseId")
                    .or_else(|| part.get("tool_use_id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            ),
            name: part
                .get("name")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            result: part.get("content").cloned().unwrap_or(Value::Null),
            is_error: part.get("isError").and_then(Value::as_bool),
            created_at,
        }),
        other => placeholder(
            id.clone(),
            created_at,
            format!("[unsupported content: {other}]"),
        ),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage 2: cross-message tool pairing
// ─────────────────────────────────────────────────────────────────────────────

/// Merge every matched call/result pair into one `tool_interaction` entry
/// at the call's position, removing both consumed entries.
///
/// Two-phase: build the correlation index over the whole flattened list
/// first, then rewrite — so a result living in a later message (or earlier,
/// if sources delivered out of order) still pairs. An unmatched call stays
/// a standalone `tool_call` ("in flight"); a result referencing an unknown
/// call id stays a standalone `tool_result`.
#[must_use]
pub fn pair_tool_events(events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    #[derive(Default)]
    struct Slot {
        call: Option<usize>,
        result: Option<usize>,
    }

    // Phase 1: index both sides by tool-use id; first occurrence wins.
    let mut index: HashMap<ToolUseId, Slot> = HashMap::new();
    for (i, event) in events.iter().enumerate() {
        match event {
            TimelineEvent::ToolCall(call) => {
                let slot = index.entry(call.tool_use_id.clone()).or_default();
                let _ = slot.call.get_or_insert(i);
            }
            TimelineEvent::ToolResult(result) => {
                let slot = index.entry(result.tool_use_id.clone()).or_default();
                let _ = slot.result.get_or_insert(i);
            }
            _ => {}
        }
    }

    // Phase 2: resolve matched results up front, then rewrite the list.
    let mut matched_result: HashMap<usize, ToolResultEvent> = HashMap::new();
    let mut consumed: HashSet<usize> = HashSet::new();
    for slot in index.values() {
        if let (Some(call_ix), Some(result_ix)) = (slot.call, slot.result) {
            if let Some(TimelineEvent::ToolResult(result)) = events.get(result_ix) {
                let _ = matched_result.insert(call_ix, result.clone());
                let _ = consumed.insert(result_ix);
            }
        }
    }

    let mut out = Vec::with_capacity(events.len());
    for (i, event) in events.into_iter().enumerate() {
        if consumed.contains(&i) {
            continue;
        }
        match event {
            TimelineEvent::ToolCall(call) => {
                if let Some(result) = matched_result.remove(&i) {
                    out.push(TimelineEvent::ToolInteraction(ToolInteractionEvent {
                        id: call.id,
                        tool_use_id: call.tool_use_id,
                        name: call.name,
                        args: call.args,
                        result: result.result,
                        is_error: result.is_error,
                        created_at: call.created_at,
                        completed_at: result.created_at,
                    }));
                } else {
                    out.push(TimelineEvent::ToolCall(call));
                }
            }
            other => out.push(other),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage 3: chunk consolidation
// ─────────────────────────────────────────────────────────────────────────────

/// Fold runs of consecutive chunks sharing a `messageId` into one `text`
/// entry, concatenating deltas in arrival order.
///
/// The merged entry is `streaming` iff any member of its run still is.
/// The whole list is re-sorted by creation time afterwards, since grouping
/// can locally disturb chronological position.
#[must_use]
pub fn consolidate_chunks(events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    fn flush(run: &mut Vec<ChunkEvent>, out: &mut Vec<TimelineEvent>) {
        let Some(first) = run.first() else { return };
        let merged = TextEvent {
            id: first.message_id.clone(),
            role: first.role,
            text: run.iter().map(|c| c.delta.as_str()).collect(),
            created_at: first.created_at,
            streaming: run.iter().any(|c| c.streaming),
        };
        out.push(TimelineEvent::Text(merged));
        run.clear();
    }

    let mut out = Vec::with_capacity(events.len());
    let mut run: Vec<ChunkEvent> = Vec::new();
    for event in events {
        match event {
            TimelineEvent::Chunk(chunk) => {
                if run
                    .last()
                    .is_some_and(|prev| prev.message_id != chunk.message_id)
                {
                    flush(&mut run, &mut out);
                }
                run.push(chunk);
            }
            other => {
                flush(&mut run, &mut out);
                out.push(other);
            }
        }
    }
    flush(&mut run, &mut out);

    out.sort_by_key(TimelineEvent::created_at);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage 4: think-block grouping
// ─────────────────────────────────────────────────────────────────────────────

/// Collapse runs of consecutive calls to the configured scratchpad tool.
///
/// Single left-to-right pass: any non-matching entry flushes the buffer.
/// A run of one call is emitted unchanged; two or more collapse into a
/// `think_group` carrying the ordered originals. The buffer is flushed
/// once more at end of input.
#[must_use]
pub fn group_think_blocks(
    events: Vec<TimelineEvent>,
    options: &ProjectorOptions,
) -> Vec<TimelineEvent> {
    fn flush(buffer: &mut Vec<ToolCallEvent>, out: &mut Vec<TimelineEvent>) {
        match buffer.len() {
            0 => {}
            1 => {
                if let Some(call) = buffer.pop() {
                    out.push(TimelineEvent::ToolCall(call));
                }
            }
            _ => {
                let calls = std::mem::take(buffer);
                out.push(TimelineEvent::ThinkGroup(ThinkGroupEvent {
                    id: calls[0].id.clone(),
                    created_at: calls[0].created_at,
                    calls,
                }));
            }
        }
    }

    let mut out = Vec::with_capacity(events.len());
    let mut buffer: Vec<ToolCallEvent> = Vec::new();
    for event in events {
        match event {
            TimelineEvent::ToolCall(call) if call.name == options.think_tool => {
                buffer.push(call);
            }
            other => {
                flush(&mut buffer, &mut out);
                out.push(other);
            }
        }
    }
    flush(&mut buffer, &mut out);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage 5: final-turn detection
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the entry at `index` is the last assistant text before the next
/// user entry (or end of stream).
///
/// Non-text entries (tool activity, groups) between the candidate and the
/// deciding entry are skipped.
#[must_use]
pub fn is_final_assistant_text(timeline: &[TimelineEvent], index: usize) -> bool {
    let Some(TimelineEvent::Text(candidate)) = timeline.get(index) else {
        return false;
    };
    if candidate.role != Role::Assistant {
        return false;
    }
    for event in &timeline[index + 1..] {
        match event.role() {
            Some(Role::User) => return true,
            Some(Role::Assistant) if matches!(event, TimelineEvent::Text(_)) => return false,
            _ => {}
        }
    }
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
