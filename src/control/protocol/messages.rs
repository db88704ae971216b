//! Bridge message types
//!
//! Both directions use the same envelope: `{"type": "<name>", "payload": {...}}`
//! with camelCase payload fields.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;

use crate::config::Settings;
use crate::types::identifiers::{SessionId, ToolName, ToolUseId};
use crate::types::messages::Message;
use crate::types::permissions::{PermissionRequest, PermissionResult};
use crate::types::session::{Session, SessionStatus, SessionSummary};

/// Command from the UI to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientCommand {
    /// Create a session and run its first turn
    #[serde(rename = "session.start", rename_all = "camelCase")]
    SessionStart {
        /// Working directory
        cwd: PathBuf,
        /// First prompt
        prompt: String,
        /// Explicit title; derived from the prompt when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Run another turn in an existing session
    #[serde(rename = "session.continue", rename_all = "camelCase")]
    SessionContinue {
        /// Target session
        session_id: SessionId,
        /// Next prompt
        prompt: String,
    },
    /// Ask for a session's full history
    #[serde(rename = "session.history", rename_all = "camelCase")]
    SessionHistory {
        /// Target session
        session_id: SessionId,
    },
    /// Delete a session, cancelling its work
    #[serde(rename = "session.delete", rename_all = "camelCase")]
    SessionDelete {
        /// Target session
        session_id: SessionId,
    },
    /// Abort the running turn, keeping the session
    #[serde(rename = "session.stop", rename_all = "camelCase")]
    SessionStop {
        /// Target session
        session_id: SessionId,
    },
    /// List session summaries
    #[serde(rename = "session.list")]
    SessionList {},
    /// Human decision on a pending tool call
    #[serde(rename = "permission.response", rename_all = "camelCase")]
    PermissionResponse {
        /// Session of the request
        session_id: SessionId,
        /// Call being decided
        tool_use_id: ToolUseId,
        /// The decision
        result: PermissionResult,
    },
    /// Ask for the current settings
    #[serde(rename = "settings.get")]
    SettingsGet {},
    /// Persist new settings
    #[serde(rename = "settings.save")]
    SettingsSave {
        /// Settings to save
        settings: Settings,
    },
}

/// Event from the core to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Raw model output of a running turn
    #[serde(rename = "stream.message", rename_all = "camelCase")]
    StreamMessage {
        /// Session of the turn
        session_id: SessionId,
        /// `{"type": "stream_event", "event": ...}`
        message: Value,
    },
    /// A tool call needs a decision
    #[serde(rename = "permission.request", rename_all = "camelCase")]
    PermissionRequest {
        /// Session of the call
        session_id: SessionId,
        /// Call id to answer with
        tool_use_id: ToolUseId,
        /// Requested tool
        tool_name: ToolName,
        /// Arguments as the agent sent them
        arguments: Value,
        /// Side effects of the tool
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        capabilities: Vec<String>,
    },
    /// Snapshot of a session after a change
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Consistent snapshot
        session: Session,
    },
    /// Session summaries
    #[serde(rename = "session.list")]
    SessionList {
        /// Most recently updated first
        sessions: Vec<SessionSummary>,
    },
    /// Full history of a session
    #[serde(rename = "session.history", rename_all = "camelCase")]
    SessionHistory {
        /// Session
        session_id: SessionId,
        /// Current status
        status: SessionStatus,
        /// All messages
        messages: Vec<Message>,
    },
    /// A session was removed
    #[serde(rename = "session.deleted", rename_all = "camelCase")]
    SessionDeleted {
        /// Removed session
        session_id: SessionId,
    },
    /// Current settings
    #[serde(rename = "settings.loaded")]
    SettingsLoaded {
        /// Settings in effect
        settings: Settings,
    },
    /// Something the user should know went wrong
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        /// Human-readable message
        message: String,
        /// Session concerned, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
}

impl ServerEvent {
    /// Wrap a raw stream event for the UI
    #[must_use]
    pub fn stream_event(session_id: SessionId, raw: Value) -> Self {
        Self::StreamMessage {
            session_id,
            message: json!({"type": "stream_event", "event": raw}),
        }
    }

    /// Permission prompt for a recorded request
    #[must_use]
    pub fn permission_request(session_id: SessionId, request: &PermissionRequest) -> Self {
        Self::PermissionRequest {
            session_id,
            tool_use_id: request.tool_use_id.clone(),
            tool_name: request.tool_name.clone(),
            arguments: request.arguments.clone(),
            capabilities: request.capabilities.clone(),
        }
    }

    /// Error event
    pub fn error(message: impl Into<String>, session_id: Option<SessionId>) -> Self {
        Self::Error {
            message: message.into(),
            session_id,
        }
    }

    /// Session this event concerns, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::StreamMessage { session_id, .. }
            | Self::PermissionRequest { session_id, .. }
            | Self::SessionHistory { session_id, .. }
            | Self::SessionDeleted { session_id } => Some(session_id),
            Self::SessionUpdated { session } => Some(&session.id),
            Self::Error { session_id, .. } => session_id.as_ref(),
            Self::SessionList { .. } | Self::SettingsLoaded { .. } => None,
        }
    }
}
