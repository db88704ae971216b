//! Message-related type definitions
//!
//! Conversation history is a sequence of [`Message`]s, each an ordered list of
//! [`ContentBlock`]s. Tool calls and their results are content blocks too, so
//! the history alone is enough to replay a session to the agent runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{ToolName, ToolUseId};

// ============================================================================
// Tool Results
// ============================================================================

/// Outcome of one tool execution
///
/// Serialized as `{"success": true, "output": ...}` or
/// `{"success": false, "error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool succeeded
    pub success: bool,
    /// Tool output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error text on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Successful result carrying `output`
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Failed result carrying `error`
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Text to hand back to the agent, whichever variant this is
    #[must_use]
    pub fn text(&self) -> &str {
        if self.success {
            self.output.as_deref().unwrap_or_default()
        } else {
            self.error.as_deref().unwrap_or_default()
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human prompt
    User,
    /// Model output
    Assistant,
    /// Tool results fed back to the model
    Tool,
}

/// Content block types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// Text content
        text: String,
    },
    /// Tool use request
    ToolUse {
        /// Tool call ID
        id: ToolUseId,
        /// Tool name
        name: ToolName,
        /// Tool input parameters
        input: serde_json::Value,
    },
    /// Tool execution result
    ToolResult {
        /// ID of the tool use this is a result for
        tool_use_id: ToolUseId,
        /// Result payload
        #[serde(flatten)]
        result: ToolResult,
    },
}

impl ContentBlock {
    /// Text block constructor
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// One entry of a session's conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
    /// True while the assistant is still streaming into this message
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub streaming: bool,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message from blocks
    #[must_use]
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            streaming: false,
            timestamp: Utc::now(),
        }
    }

    /// User prompt message
    pub fn user(prompt: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(prompt)])
    }

    /// Assistant message still receiving streamed content
    #[must_use]
    pub fn streaming_assistant() -> Self {
        Self {
            streaming: true,
            ..Self::new(Role::Assistant, Vec::new())
        }
    }

    /// Tool result message for one call
    #[must_use]
    pub fn tool_result(tool_use_id: ToolUseId, result: ToolResult) -> Self {
        Self::new(
            Role::Tool,
            vec![ContentBlock::ToolResult {
                tool_use_id,
                result,
            }],
        )
    }

    /// Concatenated text of all text blocks
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Call ids of the tool uses in this message
    pub fn tool_use_ids(&self) -> impl Iterator<Item = &ToolUseId> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, .. } => Some(id),
            _ => None,
        })
    }
}
