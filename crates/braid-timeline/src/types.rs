//! The [`TimelineEvent`] union — the projector's output contract.
//!
//! This is a consumer-facing wire boundary: the `kind` tags and camelCase
//! field names are depended on by rendering layers and must stay stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use braid_core::events::Role;
use braid_core::ids::{EventId, ToolUseId};

/// One display-ready timeline entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEvent {
    /// Finished text from one participant.
    Text(TextEvent),
    /// A tool invocation with no result yet ("in flight").
    ToolCall(ToolCallEvent),
    /// A tool outcome whose call is unknown.
    ToolResult(ToolResultEvent),
    /// A call merged with its matched result.
    ToolInteraction(ToolInteractionEvent),
    /// A streamed fragment of in-progress text.
    Chunk(ChunkEvent),
    /// A run of consecutive scratchpad tool calls, collapsed for display.
    ThinkGroup(ThinkGroupEvent),
}

/// Finished text from one participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEvent {
    /// Originating event id.
    pub id: EventId,
    /// Who produced the text.
    pub role: Role,
    /// The text content.
    pub text: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// True while the text is still being streamed.
    #[serde(default)]
    pub streaming: bool,
}

/// A standalone tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEvent {
    /// Originating event id.
    pub id: EventId,
    /// Tool-use identifier shared with the eventual result.
    pub tool_use_id: ToolUseId,
    /// Tool name.
    pub name: String,
    /// Opaque structured arguments.
    pub args: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A standalone tool outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEvent {
    /// Originating event id.
    pub id: EventId,
    /// Identifier of the tool invocation this answers.
    pub tool_use_id: ToolUseId,
    /// Tool name, when resolvable (some sources omit it on the result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque structured result.
    pub result: Value,
    /// Whether the tool reported failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A tool call merged with its matched result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInteractionEvent {
    /// The call's event id (the interaction sits at the call's position).
    pub id: EventId,
    /// Shared tool-use identifier.
    pub tool_use_id: ToolUseId,
    /// Tool name, taken from the call side.
    pub name: String,
    /// The call's arguments.
    pub args: Value,
    /// The result payload.
    pub result: Value,
    /// Whether the tool reported failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// The call's creation timestamp.
    pub created_at: DateTime<Utc>,
    /// The result's creation timestamp.
    pub completed_at: DateTime<Utc>,
}

/// A streamed fragment of in-progress text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEvent {
    /// This fragment's event id.
    pub id: EventId,
    /// Identifier of the message this fragment belongs to.
    pub message_id: EventId,
    /// Who is producing the text.
    pub role: Role,
    /// The fragment's text delta.
    pub delta: String,
    /// True while the owning message is still open.
    #[serde(default)]
    pub streaming: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A collapsed run of scratchpad tool calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkGroupEvent {
    /// The first call's event id.
    pub id: EventId,
    /// The original calls, in order.
    pub calls: Vec<ToolCallEvent>,
    /// The first call's creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TimelineEvent {
    /// The `kind` tag string of this entry.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
            Self::ToolInteraction(_) => "tool_interaction",
            Self::Chunk(_) => "chunk",
            Self::ThinkGroup(_) => "think_group",
        }
    }

    /// Creation timestamp (chronological sort key).
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Text(e) => e.created_at,
            Self::ToolCall(e) => e.created_at,
            Self::ToolResult(e) => e.created_at,
            Self::ToolInteraction(e) => e.created_at,
            Self::Chunk(e) => e.created_at,
            Self::ThinkGroup(e) => e.created_at,
        }
    }

    /// The participant role, for entries that carry one.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Text(e) => Some(e.role),
            Self::Chunk(e) => Some(e.role),
            _ => None,
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

    #[test]
    fn text_wire_format() {
        let event = TimelineEvent::Text(TextEvent {
            id: EventId::from("evt_1"),
            role: Role::Assistant,
            text: "done".into(),
            created_at: "2026-02-01T10:00:00Z".parse().unwrap(),
            streaming: false,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["createdAt"], "2026-02-01T10:00:00Z");
    }

    #[test]
    fn tool_interaction_wire_format() {
        let event = TimelineEvent::ToolInteraction(ToolInteractionEvent {
            id: EventId::from("evt_c"),
            tool_use_id: ToolUseId::from("call_123"),
            name: "search_files".into(),
            args: json!({"query": "foo"}),
            result: json!(["a.rs"]),
            is_error: None,
            created_at: "2026-02-01T10:00:00Z".parse().unwrap(),
            completed_at: "2026-02-01T10:00:02Z".parse().unwrap(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "tool_interaction");
        assert_eq!(json["toolUseId"], "call_123");
        assert_eq!(json["completedAt"], "2026-02-01T10:00:02Z");
        assert!(json.get("isError").is_none());
    }

    #[test]
    fn think_group_nests_calls() {
        let call = ToolCallEvent {
            id: EventId::from("evt_t"),
            tool_use_id: ToolUseId::from("t1"),
            name: "think".into(),
            args: json!({"thought": "hm"}),
            created_at: "2026-02-01T10:00:00Z".parse().unwrap(),
        };
        let event = TimelineEvent::ThinkGroup(ThinkGroupEvent {
            id: call.id.clone(),
            created_at: call.created_at,
            calls: vec![call.clone(), call],
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "think_group");
        assert_eq!(json["calls"].as_array().unwrap().len(), 2);
        assert_eq!(json["calls"][0]["name"], "think");
    }

    #[test]
    fn round_trip_is_lossless() {
        let event = TimelineEvent::Chunk(ChunkEvent {
            id: EventId::from("evt_1"),
            message_id: EventId::from("evt_m"),
            role: Role::Assistant,
            delta: "par".into(),
            streaming: true,
            created_at: "2026-02-01T10:00:00Z".parse().unwrap(),
        });
        let json = serde_json::to_value(&event).unwrap();
        let back: TimelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn kind_and_sort_key_accessors() {
        let event = TimelineEvent::ToolCall(ToolCallEvent {
            id: EventId::from("evt_1"),
            tool_use_id: ToolUseId::from("t1"),
            name: "bash".into(),
            args: json!({}),
            created_at: "2026-02-01T10:00:00Z".parse().unwrap(),
        });
        assert_eq!(event.kind(), "tool_call");
        assert_eq!(
            event.created_at(),
            "2026-02-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(event.role().is_none());
    }
}
