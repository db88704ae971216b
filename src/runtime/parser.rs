//! Line protocol between the core and an agent process
//!
//! Core to agent: a `turn` line, then one `tool_result` line per tool use.
//! Agent to core: `stream_event`, `tool_use`, `result` and `error` lines.
//! Unknown line types are skipped so runtimes can add diagnostics.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{CoreError, Result};
use crate::types::identifiers::{ToolName, ToolUseId};

use super::{RuntimeEvent, ToolReply, TurnRequest};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    StreamEvent {
        event: Value,
    },
    ToolUse {
        id: ToolUseId,
        name: ToolName,
        #[serde(default)]
        input: Value,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

const KNOWN_TYPES: &[&str] = &["stream_event", "tool_use", "result", "error"];

/// Parse one line from the agent into an event
///
/// Returns `Ok(None)` for line types the core does not consume.
///
/// # Errors
/// Returns `CoreError::JsonDecode` if a known line type is malformed
pub fn parse_event(data: Value) -> Result<Option<RuntimeEvent>> {
    let kind = data.get("type").and_then(Value::as_str).unwrap_or_default();
    if !KNOWN_TYPES.contains(&kind) {
        log::trace!("Skipping agent line of type {kind:?}");
        return Ok(None);
    }
    let event = serde_json::from_value::<WireEvent>(data)
        .map_err(|e| CoreError::json_decode(format!("Failed to parse agent event: {e}")))?;
    Ok(Some(match event {
        WireEvent::StreamEvent { event } => RuntimeEvent::stream(event),
        WireEvent::ToolUse { id, name, input } => RuntimeEvent::ToolUse { id, name, input },
        WireEvent::Result {
            result,
            is_error: true,
        } => RuntimeEvent::Failed {
            message: result.unwrap_or_else(|| "Agent reported an error".to_string()),
        },
        WireEvent::Result { result, .. } => RuntimeEvent::Completed { result },
        WireEvent::Error { message } => RuntimeEvent::Failed { message },
    }))
}

/// Encode the opening line of a turn
///
/// # Errors
/// Returns error if the request cannot be serialized
pub fn encode_turn(request: &TurnRequest) -> Result<String> {
    let mut value = serde_json::to_value(request)?;
    if let Value::Object(ref mut map) = value {
        map.insert("type".to_string(), json!("turn"));
    }
    Ok(serde_json::to_string(&value)?)
}

/// Encode a tool reply line
///
/// # Errors
/// Returns error if the reply cannot be serialized
pub fn encode_reply(reply: &ToolReply) -> Result<String> {
    Ok(serde_json::to_string(&json!({
        "type": "tool_result",
        "toolUseId": reply.tool_use_id,
        "result": reply.result,
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEvent;
    use crate::types::messages::ToolResult;

    #[test]
    fn parses_each_line_type() {
        let stream = parse_event(json!({
            "type": "stream_event",
            "event": {"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Hi"}}
        }))
        .unwrap()
        .unwrap();
        assert!(matches!(
            stream,
            RuntimeEvent::Stream { event: StreamEvent::BlockDelta { ref text, .. }, .. } if text == "Hi"
        ));

        let tool = parse_event(json!({"type": "tool_use", "id": "c1", "name": "Read", "input": {"file_path": "a"}}))
            .unwrap()
            .unwrap();
        assert_eq!(
            tool,
            RuntimeEvent::ToolUse {
                id: "c1".into(),
                name: "Read".into(),
                input: json!({"file_path": "a"}),
            }
        );

        assert_eq!(
            parse_event(json!({"type": "result", "result": "done"})).unwrap(),
            Some(RuntimeEvent::Completed { result: Some("done".into()) })
        );
        assert_eq!(
            parse_event(json!({"type": "result", "is_error": true, "result": "quota"})).unwrap(),
            Some(RuntimeEvent::Failed { message: "quota".into() })
        );
        assert_eq!(
            parse_event(json!({"type": "error", "message": "boom"})).unwrap(),
            Some(RuntimeEvent::Failed { message: "boom".into() })
        );
    }

    #[test]
    fn unknown_lines_are_skipped_and_malformed_ones_fail() {
        assert_eq!(parse_event(json!({"type": "system", "subtype": "init"})).unwrap(), None);
        assert!(parse_event(json!({"type": "tool_use", "name": "Read"})).is_err());
    }

    #[test]
    fn reply_line_shape() {
        let line = encode_reply(&ToolReply {
            tool_use_id: "c1".into(),
            result: ToolResult::err("nope"),
        })
        .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["toolUseId"], "c1");
        assert_eq!(value["result"]["success"], false);
        assert_eq!(value["result"]["error"], "nope");
    }
}
