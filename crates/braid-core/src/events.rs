//! The [`CanonicalEvent`] tagged union — the normalized representation of one
//! unit of session activity.
//!
//! Events arrive from two heterogeneous sources (a one-shot historical batch
//! and a live push transport) and are folded into a single canonical shape at
//! the normalization boundary. Past that boundary no code inspects raw JSON:
//! everything operates on this union.
//!
//! The wire format has base fields (`id`, `sessionId`, `createdAt`, `role`,
//! `partial`, `source`) at the top level with the `kind`-specific payload
//! flattened alongside them, discriminated by the `kind` tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EventId, SessionId, ToolUseId};

// ─────────────────────────────────────────────────────────────────────────────
// Base field enums
// ─────────────────────────────────────────────────────────────────────────────

/// Who produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Human input.
    User,
    /// Model output.
    Assistant,
    /// Host/system activity.
    System,
}

/// Which ingestion path delivered an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Replayed from the one-shot historical batch on session open.
    Historical,
    /// Pushed by the live (at-least-once, possibly redelivering) transport.
    Live,
}

/// Streaming lifecycle of an event.
///
/// `Finalized` is terminal: a finished event never goes back to `Streaming`.
/// Derived from the wire-level `partial` flag via
/// [`CanonicalEvent::stream_state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Content is still being streamed; a later upsert with the same id
    /// will carry more of it.
    Streaming,
    /// Content is complete.
    Finalized,
}

impl StreamState {
    /// Whether this state still expects further updates.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Streaming)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Content nodes
// ─────────────────────────────────────────────────────────────────────────────

/// One content part inside a `message` event.
///
/// Some sources encode tool activity as content parts of a message rather
/// than as standalone events; the `tool_use` / `tool_result` variants carry
/// enough to correlate them anyway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentNode {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// An embedded tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolUse {
        /// Tool-use identifier shared with the eventual result.
        id: ToolUseId,
        /// Tool name.
        name: String,
        /// Opaque structured arguments.
        input: Value,
    },
    /// An embedded tool outcome.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Identifier of the tool invocation this answers.
        tool_use_id: ToolUseId,
        /// Opaque structured result.
        content: Value,
        /// Whether the tool reported failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Checkpoint payload pieces
// ─────────────────────────────────────────────────────────────────────────────

/// Which edge of a checkpoint an event marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPhase {
    /// Checkpoint opened.
    Start,
    /// Checkpoint closed.
    End,
}

/// Change statistics attached to a checkpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStats {
    /// Files touched.
    pub files_changed: i64,
    /// Lines added.
    pub insertions: i64,
    /// Lines removed.
    pub deletions: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// CanonicalEvent
// ─────────────────────────────────────────────────────────────────────────────

/// `kind`-specific payload of a [`CanonicalEvent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A chat message: an ordered list of content nodes.
    Message {
        /// Message content parts.
        content: Vec<ContentNode>,
    },
    /// A standalone tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Tool-use identifier shared with the eventual result.
        tool_use_id: ToolUseId,
        /// Tool name.
        name: String,
        /// Opaque structured arguments.
        args: Value,
    },
    /// A standalone tool outcome.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Identifier of the tool invocation this answers.
        tool_use_id: ToolUseId,
        /// Opaque structured result.
        result: Value,
        /// Whether the tool reported failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// A periodic checkpoint marker.
    Checkpoint {
        /// Start or end edge.
        phase: CheckpointPhase,
        /// Optional commit/version reference.
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
        /// Optional change statistics.
        #[serde(skip_serializing_if = "Option::is_none")]
        stats: Option<ChangeStats>,
    },
}

/// The normalized, tagged-union representation of one unit of session
/// activity.
///
/// Mutation discipline: events are whole-value replacements only — a
/// streaming update is a fresh upsert with the same `id`, never an in-place
/// field edit. Structural equality (`PartialEq`) is therefore the test for
/// "this re-delivery changed nothing".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    /// Opaque, session-unique, source-stable identifier.
    pub id: EventId,
    /// Session this event belongs to.
    pub session_id: SessionId,
    /// Owning user, when the source provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Creation timestamp (RFC 3339 on the wire).
    pub created_at: DateTime<Utc>,
    /// Who produced the event.
    pub role: Role,
    /// True while content is still streaming.
    #[serde(default)]
    pub partial: bool,
    /// Which ingestion path delivered the event.
    pub source: Source,
    /// Kind-specific payload, flattened into the same JSON object.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl CanonicalEvent {
    /// The `kind` tag string of this event.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::Message { .. } => "message",
            EventPayload::ToolCall { .. } => "tool_call",
            EventPayload::ToolResult { .. } => "tool_result",
            EventPayload::Checkpoint { .. } => "checkpoint",
        }
    }

    /// The tool-use identifier, for `tool_call` / `tool_result` events.
    #[must_use]
    pub fn tool_use_id(&self) -> Option<&ToolUseId> {
        match &self.payload {
            EventPayload::ToolCall { tool_use_id, .. }
            | EventPayload::ToolResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }

    /// Whether this is a standalone tool invocation.
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        matches!(self.payload, EventPayload::ToolCall { .. })
    }

    /// Whether this is a standalone tool outcome.
    #[must_use]
    pub fn is_tool_result(&self) -> bool {
        matches!(self.payload, EventPayload::ToolResult { .. })
    }

    /// Streaming lifecycle state, derived from the `partial` flag.
    #[must_use]
    pub fn stream_state(&self) -> StreamState {
        if self.partial {
            StreamState::Streaming
        } else {
            StreamState::Finalized
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(id: &str) -> CanonicalEvent {
        CanonicalEvent {
            id: EventId::from(id),
            session_id: SessionId::from("sess_1"),
            user_id: None,
            created_at: "2026-02-01T10:00:00Z".parse().unwrap(),
            role: Role::User,
            partial: false,
            source: Source::Historical,
            payload: EventPayload::Message {
                content: vec![ContentNode::Text {
                    text: "hello".into(),
                }],
            },
        }
    }

    // ── Wire format ──────────────────────────────────────────────────────

    #[test]
    fn message_wire_format() {
        let json = serde_json::to_value(message("evt_1")).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["id"], "evt_1");
        assert_eq!(json["sessionId"], "sess_1");
        assert_eq!(json["role"], "user");
        assert_eq!(json["source"], "historical");
        assert_eq!(json["content"][0]["type"], "text");
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn tool_call_wire_format() {
        let event = CanonicalEvent {
            payload: EventPayload::ToolCall {
                tool_use_id: ToolUseId::from("tool_123"),
                name: "search_files".into(),
                args: json!({"query": "foo"}),
            },
            role: Role::Assistant,
            ..message("evt_2")
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "tool_call");
        assert_eq!(json["toolUseId"], "tool_123");
        assert_eq!(json["name"], "search_files");
        assert_eq!(json["args"]["query"], "foo");
    }

    #[test]
    fn tool_result_error_flag_skipped_when_none() {
        let event = CanonicalEvent {
            payload: EventPayload::ToolResult {
                tool_use_id: ToolUseId::from("tool_123"),
                result: json!("ok"),
                is_error: None,
            },
            ..message("evt_3")
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("isError").is_none());
    }

    #[test]
    fn checkpoint_wire_format() {
        let event = CanonicalEvent {
            payload: EventPayload::Checkpoint {
                phase: CheckpointPhase::Start,
                reference: Some("abc123".into()),
                stats: Some(ChangeStats {
                    files_changed: 2,
                    insertions: 10,
                    deletions: 3,
                }),
            },
            role: Role::System,
            ..message("evt_4")
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "checkpoint");
        assert_eq!(json["phase"], "start");
        assert_eq!(json["reference"], "abc123");
        assert_eq!(json["stats"]["filesChanged"], 2);
    }

    #[test]
    fn round_trip_is_lossless() {
        let event = message("evt_1");
        let json = serde_json::to_value(&event).unwrap();
        let back: CanonicalEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn partial_defaults_to_false() {
        let json = json!({
            "id": "evt_1",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:00Z",
            "role": "assistant",
            "source": "live",
            "kind": "message",
            "content": [],
        });
        let event: CanonicalEvent = serde_json::from_value(json).unwrap();
        assert!(!event.partial);
        assert_eq!(event.stream_state(), StreamState::Finalized);
    }

    // ── Accessors ────────────────────────────────────────────────────────

    #[test]
    fn kind_strings() {
        assert_eq!(message("e").kind(), "message");
        let call = CanonicalEvent {
            payload: EventPayload::ToolCall {
                tool_use_id: ToolUseId::from("t"),
                name: "bash".into(),
                args: json!({}),
            },
            ..message("e")
        };
        assert_eq!(call.kind(), "tool_call");
        assert!(call.is_tool_call());
        assert!(!call.is_tool_result());
        assert_eq!(call.tool_use_id(), Some(&ToolUseId::from("t")));
    }

    #[test]
    fn message_has_no_tool_use_id() {
        assert!(message("e").tool_use_id().is_none());
    }

    #[test]
    fn stream_state_open_while_partial() {
        let mut event = message("e");
        event.partial = true;
        assert_eq!(event.stream_state(), StreamState::Streaming);
        assert!(event.stream_state().is_open());
        assert!(!StreamState::Finalized.is_open());
    }
}
