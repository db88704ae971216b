//! Agent runtime interface
//!
//! The model runtime is an external collaborator. Per turn it receives a
//! [`TurnRequest`], emits [`RuntimeEvent`]s in order, and accepts
//! [`ToolReply`]s for the tool uses it emitted.
//!
//! - [`ScriptedRuntime`] - replays scripted turns, for tests and demos
//! - [`ProcessRuntime`] - runs a configured agent program per turn over JSON
//!   lines

mod parser;
mod process;
mod scripted;

pub use parser::{encode_reply, encode_turn, parse_event};
pub use process::ProcessRuntime;
pub use scripted::{ScriptStep, ScriptedRuntime, ScriptedTurn};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::error::Result;
use crate::stream::StreamEvent;
use crate::tools::ToolDefinition;
use crate::types::identifiers::{SessionId, ToolName, ToolUseId};
use crate::types::messages::{Message, ToolResult};

/// Everything the runtime needs to run one turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Session the turn belongs to
    pub session_id: SessionId,
    /// Working directory of the session
    pub cwd: PathBuf,
    /// New user prompt
    pub prompt: String,
    /// Conversation so far, excluding the new prompt
    pub history: Vec<Message>,
    /// Tools the agent may call
    pub tools: Vec<ToolDefinition>,
    /// Model settings
    pub settings: Settings,
}

/// One event of a running turn
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// Low-level model output
    Stream {
        /// Decoded event
        event: StreamEvent,
        /// The event as received, forwarded to the UI
        raw: Value,
    },
    /// The agent wants a tool executed
    ToolUse {
        /// Call id
        id: ToolUseId,
        /// Tool name
        name: ToolName,
        /// Arguments
        input: Value,
    },
    /// The turn finished normally
    Completed {
        /// Final result text, if the runtime reports one
        result: Option<String>,
    },
    /// The turn failed inside the runtime
    Failed {
        /// What went wrong
        message: String,
    },
}

impl RuntimeEvent {
    /// Stream event wrapper that decodes `raw`
    #[must_use]
    pub fn stream(raw: Value) -> Self {
        Self::Stream {
            event: StreamEvent::decode(&raw),
            raw,
        }
    }

    /// Whether the event ends the turn
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Outcome of a tool use, sent back to the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    /// Call id being answered
    pub tool_use_id: ToolUseId,
    /// Tool outcome
    pub result: ToolResult,
}

/// Channels of one running turn
///
/// Dropping the handle aborts the turn.
pub struct TurnHandle {
    /// Events in emission order
    pub events: mpsc::UnboundedReceiver<Result<RuntimeEvent>>,
    /// Tool replies back to the runtime
    pub replies: mpsc::UnboundedSender<ToolReply>,
}

/// An agent execution engine
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start one turn
    ///
    /// # Errors
    /// Returns error if the runtime cannot be started
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnHandle>;
}
