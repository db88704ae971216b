//! Decoding of low-level model output fragments
//!
//! Runtime stream events follow the content-block framing
//! (`content_block_start` / `content_block_delta` / `content_block_stop`).
//! Decoding is lenient: anything that is not a block event becomes
//! [`StreamEvent::Other`], and a delta whose fragment is missing or malformed
//! carries an empty string instead of failing the turn.

use serde_json::Value;

/// Kind of content block being streamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// Visible assistant text
    Text,
    /// Extended thinking
    Thinking,
    /// Tool call arguments
    ToolUse,
    /// Anything else, by its declared type
    Other(String),
}

impl BlockKind {
    fn from_type(kind: Option<&str>) -> Self {
        match kind {
            Some("text") | None => Self::Text,
            Some("thinking") => Self::Thinking,
            Some("tool_use") => Self::ToolUse,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

/// One decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A content block opens
    BlockStart {
        /// Block index within the message
        index: u64,
        /// What the block carries
        kind: BlockKind,
    },
    /// A fragment of the open block
    BlockDelta {
        /// Block index within the message
        index: u64,
        /// Fragment text, empty when absent or malformed
        text: String,
    },
    /// The block closes
    BlockStop {
        /// Block index within the message
        index: u64,
    },
    /// Message-level or unknown event
    Other,
}

impl StreamEvent {
    /// Decode a raw stream event
    #[must_use]
    pub fn decode(raw: &Value) -> Self {
        let index = raw.get("index").and_then(Value::as_u64).unwrap_or(0);
        match raw.get("type").and_then(Value::as_str) {
            Some("content_block_start") => Self::BlockStart {
                index,
                kind: BlockKind::from_type(
                    raw.pointer("/content_block/type").and_then(Value::as_str),
                ),
            },
            Some("content_block_delta") => Self::BlockDelta {
                index,
                text: delta_fragment(raw.get("delta")),
            },
            Some("content_block_stop") => Self::BlockStop { index },
            _ => Self::Other,
        }
    }
}

/// Extract the fragment of a delta
///
/// The field holding the fragment is named by the delta type's prefix:
/// `text_delta` carries `text`, `thinking_delta` carries `thinking`.
fn delta_fragment(delta: Option<&Value>) -> String {
    let Some(delta) = delta else {
        return String::new();
    };
    let field = delta
        .get("type")
        .and_then(Value::as_str)
        .and_then(|kind| kind.split('_').next())
        .unwrap_or("text");
    delta
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_default()
}
