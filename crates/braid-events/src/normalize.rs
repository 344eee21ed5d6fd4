//! Ingestion boundary: raw source records → [`CanonicalEvent`].
//!
//! Both historical rows and live deltas pass through here before they reach
//! the store. A record that cannot be normalized is rejected with a
//! [`ValidationError`] — returned, never thrown — so the batch caller can
//! skip it and keep processing siblings.
//!
//! Normalization is deterministic: the same raw record always yields a
//! structurally equal canonical event, which is what makes the store's
//! replacement-is-a-no-op optimization safe.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use braid_core::errors::ValidationError;
use braid_core::events::{
    CanonicalEvent, CheckpointPhase, ContentNode, EventPayload, Role, Source,
};
use braid_core::ids::{EventId, SessionId, ToolUseId};
use braid_core::text::preview;

/// A normalized batch: the events that decoded plus per-record failures.
///
/// Failures carry the record's index in the input array so a UI can report
/// "N records failed to parse" with pointers back to the raw rows.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Successfully normalized events, in input order.
    pub events: Vec<CanonicalEvent>,
    /// Records that were rejected.
    pub failures: Vec<BatchFailure>,
}

/// One rejected record in a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Index into the input array.
    pub index: usize,
    /// Why the record was rejected.
    pub error: ValidationError,
}

/// Normalize one raw record into a canonical event.
///
/// Rejects records missing `id`, `createdAt`, or `kind`, records whose
/// timestamp is not RFC 3339, and records whose kind-specific payload cannot
/// be decoded.
pub fn normalize(raw: &Value, source: Source) -> Result<CanonicalEvent, ValidationError> {
    let obj = raw.as_object().ok_or(ValidationError::InvalidField {
        field: "record",
        reason: "not a JSON object".into(),
    })?;

    let id = require_str(raw, "id")?;
    let created_at = parse_created_at(require_str(raw, "createdAt")?)?;
    let kind = require_str(raw, "kind")?;

    let explicit_role = match obj.get("role") {
        None => None,
        Some(v) => Some(parse_role(v)?),
    };
    let partial = obj.get("partial").and_then(Value::as_bool).unwrap_or(false);
    let user_id = obj
        .get("userId")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let (payload, default_role) = decode_payload(raw, kind)?;
    let role = match (explicit_role, default_role) {
        (Some(role), _) => role,
        (None, Some(role)) => role,
        (None, None) => return Err(ValidationError::MissingField("role")),
    };

    Ok(CanonicalEvent {
        id: EventId::from(id),
        session_id: SessionId::from(require_str(raw, "sessionId")?),
        user_id,
        created_at,
        role,
        partial,
        source,
        payload,
    })
}

/// Normalize a whole batch, collecting per-record failures.
///
/// A rejected record never aborts its siblings; each failure is logged and
/// surfaced in the result.
pub fn normalize_batch(raws: &[Value], source: Source) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for (index, raw) in raws.iter().enumerate() {
        match normalize(raw, source) {
            Ok(event) => batch.events.push(event),
            Err(error) => {
                warn!(
                    index,
                    %error,
                    record = %preview(&raw.to_string(), 120),
                    "record failed normalization, skipping"
                );
                batch.failures.push(BatchFailure { index, error });
            }
        }
    }
    batch
}

// ─────────────────────────────────────────────────────────────────────────────
// Field helpers
// ─────────────────────────────────────────────────────────────────────────────

fn require_str<'a>(raw: &'a Value, field: &'static str) -> Result<&'a str, ValidationError> {
    match raw.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(ValidationError::InvalidField {
            field,
            reason: "empty string".into(),
        }),
        Some(other) => Err(ValidationError::InvalidField {
            field,
            reason: format!("expected string, got {other}"),
        }),
    }
}

fn parse_created_at(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidField {
            field: "createdAt",
            reason: format!("not RFC 3339: {e}"),
        })
}

fn parse_role(value: &Value) -> Result<Role, ValidationError> {
    match value.as_str() {
        Some("user") => Ok(Role::User),
        Some("assistant") => Ok(Role::Assistant),
        Some("system") => Ok(Role::System),
        _ => Err(ValidationError::InvalidField {
            field: "role",
            reason: format!("unrecognized role {value}"),
        }),
    }
}

/// Decode the kind-specific payload. Returns the payload plus the role to
/// assume when the record carries none.
fn decode_payload(
    raw: &Value,
    kind: &str,
) -> Result<(EventPayload, Option<Role>), ValidationError> {
    match kind {
        "message" => decode_message(raw),
        "tool_call" => Ok((
            EventPayload::ToolCall {
                tool_use_id: ToolUseId::from(require_str(raw, "toolUseId")?),
                name: require_str(raw, "name")?.to_owned(),
                args: raw.get("args").cloned().unwrap_or(Value::Null),
            },
            Some(Role::Assistant),
        )),
        "tool_result" => Ok((
            EventPayload::ToolResult {
                tool_use_id: ToolUseId::from(require_str(raw, "toolUseId")?),
                result: raw.get("result").cloned().unwrap_or(Value::Null),
                is_error: raw.get("isError").and_then(Value::as_bool),
            },
            Some(Role::User),
        )),
        "checkpoint" => {
            let phase = match require_str(raw, "phase")? {
                "start" => CheckpointPhase::Start,
                "end" => CheckpointPhase::End,
                other => {
                    return Err(ValidationError::InvalidField {
                        field: "phase",
                        reason: format!("expected 'start' or 'end', got '{other}'"),
                    });
                }
            };
            let stats = match raw.get("stats") {
                None | Some(Value::Null) => None,
                Some(v) => Some(serde_json::from_value(v.clone())?),
            };
            Ok((
                EventPayload::Checkpoint {
                    phase,
                    reference: raw
                        .get("reference")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    stats,
                },
                Some(Role::System),
            ))
        }
        other => Err(ValidationError::UnknownKind(other.to_owned())),
    }
}

/// Decode a `message` record, lifting lone embedded tool parts out into
/// dedicated `tool_call` / `tool_result` events so the correlation index
/// sees them. Mixed or multi-part content stays a message.
fn decode_message(raw: &Value) -> Result<(EventPayload, Option<Role>), ValidationError> {
    let content_value = raw
        .get("content")
        .ok_or(ValidationError::MissingField("content"))?;
    let mut content: Vec<ContentNode> = serde_json::from_value(content_value.clone())?;

    if content.len() == 1 {
        match content.pop() {
            Some(ContentNode::ToolUse { id, name, input }) => {
                return Ok((
                    EventPayload::ToolCall {
                        tool_use_id: id,
                        name,
                        args: input,
                    },
                    Some(Role::Assistant),
                ));
            }
            Some(ContentNode::ToolResult {
                tool_use_id,
                content,
                is_error,
            }) => {
                return Ok((
                    EventPayload::ToolResult {
                        tool_use_id,
                        result: content,
                        is_error,
                    },
                    Some(Role::User),
                ));
            }
            Some(node) => content.push(node),
            None => {}
        }
    }

    Ok((EventPayload::Message { content }, None))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn raw_message() -> Value {
        json!({
            "id": "evt_1",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:00Z",
            "role": "user",
            "kind": "message",
            "content": [{"type": "text", "text": "hello"}],
        })
    }

    // ── Happy paths ──────────────────────────────────────────────────────

    #[test]
    fn message_normalizes() {
        let event = normalize(&raw_message(), Source::Historical).unwrap();
        assert_eq!(event.id.as_str(), "evt_1");
        assert_eq!(event.session_id.as_str(), "sess_1");
        assert_eq!(event.role, Role::User);
        assert_eq!(event.source, Source::Historical);
        assert_eq!(event.kind(), "message");
        assert!(!event.partial);
    }

    #[test]
    fn tool_call_normalizes_with_default_role() {
        let raw = json!({
            "id": "evt_2",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:01Z",
            "kind": "tool_call",
            "toolUseId": "tool_123",
            "name": "search_files",
            "args": {"query": "foo"},
        });
        let event = normalize(&raw, Source::Live).unwrap();
        assert_eq!(event.role, Role::Assistant);
        assert_matches!(
            &event.payload,
            EventPayload::ToolCall { tool_use_id, name, .. }
                if tool_use_id.as_str() == "tool_123" && name == "search_files"
        );
    }

    #[test]
    fn tool_result_missing_result_value_defaults_null() {
        let raw = json!({
            "id": "evt_3",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:02Z",
            "kind": "tool_result",
            "toolUseId": "tool_123",
        });
        let event = normalize(&raw, Source::Live).unwrap();
        assert_matches!(
            &event.payload,
            EventPayload::ToolResult { result, is_error: None, .. } if result.is_null()
        );
        assert_eq!(event.role, Role::User);
    }

    #[test]
    fn checkpoint_normalizes() {
        let raw = json!({
            "id": "evt_4",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:03Z",
            "kind": "checkpoint",
            "phase": "end",
            "reference": "abc123",
            "stats": {"filesChanged": 1, "insertions": 4, "deletions": 0},
        });
        let event = normalize(&raw, Source::Historical).unwrap();
        assert_eq!(event.role, Role::System);
        assert_matches!(
            &event.payload,
            EventPayload::Checkpoint { phase: CheckpointPhase::End, reference: Some(r), stats: Some(s) }
                if r == "abc123" && s.insertions == 4
        );
    }

    #[test]
    fn partial_flag_carries_through() {
        let mut raw = raw_message();
        raw["partial"] = json!(true);
        let event = normalize(&raw, Source::Live).unwrap();
        assert!(event.partial);
    }

    #[test]
    fn explicit_role_overrides_default() {
        let raw = json!({
            "id": "evt_5",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:04Z",
            "kind": "tool_result",
            "toolUseId": "tool_1",
            "role": "system",
        });
        let event = normalize(&raw, Source::Live).unwrap();
        assert_eq!(event.role, Role::System);
    }

    // ── Embedded-tool extraction ─────────────────────────────────────────

    #[test]
    fn lone_tool_use_part_becomes_tool_call() {
        let raw = json!({
            "id": "evt_6",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:05Z",
            "role": "assistant",
            "kind": "message",
            "content": [{"type": "tool_use", "id": "call_123", "name": "search_files", "input": {"q": "x"}}],
        });
        let event = normalize(&raw, Source::Historical).unwrap();
        assert_matches!(
            &event.payload,
            EventPayload::ToolCall { tool_use_id, name, .. }
                if tool_use_id.as_str() == "call_123" && name == "search_files"
        );
    }

    #[test]
    fn lone_tool_result_part_becomes_tool_result() {
        let raw = json!({
            "id": "evt_7",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:06Z",
            "role": "user",
            "kind": "message",
            "content": [{"type": "tool_result", "toolUseId": "call_123", "content": "found 3 files"}],
        });
        let event = normalize(&raw, Source::Historical).unwrap();
        assert_matches!(
            &event.payload,
            EventPayload::ToolResult { tool_use_id, .. } if tool_use_id.as_str() == "call_123"
        );
    }

    #[test]
    fn mixed_content_stays_a_message() {
        let raw = json!({
            "id": "evt_8",
            "sessionId": "sess_1",
            "createdAt": "2026-02-01T10:00:07Z",
            "role": "assistant",
            "kind": "message",
            "content": [
                {"type": "text", "text": "let me look"},
                {"type": "tool_use", "id": "call_9", "name": "bash", "input": {}},
            ],
        });
        let event = normalize(&raw, Source::Historical).unwrap();
        assert_matches!(&event.payload, EventPayload::Message { content } if content.len() == 2);
    }

    // ── Rejection ────────────────────────────────────────────────────────

    #[test]
    fn missing_id_rejected() {
        let mut raw = raw_message();
        let _ = raw.as_object_mut().unwrap().remove("id");
        assert_matches!(
            normalize(&raw, Source::Historical),
            Err(ValidationError::MissingField("id"))
        );
    }

    #[test]
    fn missing_created_at_rejected() {
        let mut raw = raw_message();
        let _ = raw.as_object_mut().unwrap().remove("createdAt");
        assert_matches!(
            normalize(&raw, Source::Historical),
            Err(ValidationError::MissingField("createdAt"))
        );
    }

    #[test]
    fn missing_kind_rejected() {
        let mut raw = raw_message();
        let _ = raw.as_object_mut().unwrap().remove("kind");
        assert_matches!(
            normalize(&raw, Source::Historical),
            Err(ValidationError::MissingField("kind"))
        );
    }

    #[test]
    fn bad_timestamp_rejected() {
        let mut raw = raw_message();
        raw["createdAt"] = json!("yesterday-ish");
        assert_matches!(
            normalize(&raw, Source::Historical),
            Err(ValidationError::InvalidField { field: "createdAt", .. })
        );
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut raw = raw_message();
        raw["kind"] = json!("hologram");
        assert_matches!(
            normalize(&raw, Source::Historical),
            Err(ValidationError::UnknownKind(k)) if k == "hologram"
        );
    }

    #[test]
    fn message_without_role_rejected() {
        let mut raw = raw_message();
        let _ = raw.as_object_mut().unwrap().remove("role");
        assert_matches!(
            normalize(&raw, Source::Historical),
            Err(ValidationError::MissingField("role"))
        );
    }

    #[test]
    fn undecodable_content_rejected() {
        let mut raw = raw_message();
        raw["content"] = json!([{"type": "teleport"}]);
        assert_matches!(
            normalize(&raw, Source::Historical),
            Err(ValidationError::Decode(_))
        );
    }

    #[test]
    fn non_object_record_rejected() {
        assert_matches!(
            normalize(&json!("just a string"), Source::Live),
            Err(ValidationError::InvalidField { field: "record", .. })
        );
    }

    // ── Idempotence & batches ────────────────────────────────────────────

    #[test]
    fn normalizing_twice_is_structurally_equal() {
        let raw = raw_message();
        let a = normalize(&raw, Source::Historical).unwrap();
        let b = normalize(&raw, Source::Historical).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn batch_collects_failures_and_continues() {
        let raws = vec![raw_message(), json!({"nope": true}), {
            let mut ok = raw_message();
            ok["id"] = json!("evt_2");
            ok
        }];
        let batch = normalize_batch(&raws, Source::Historical);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].index, 1);
        assert_eq!(batch.events[1].id.as_str(), "evt_2");
    }

    #[test]
    fn empty_batch_is_empty() {
        let batch = normalize_batch(&[], Source::Live);
        assert!(batch.events.is_empty());
        assert!(batch.failures.is_empty());
    }
}
