//! Error types for the orchestration core

use thiserror::Error;

use crate::types::permissions::Resolution;
use crate::types::session::SessionStatus;

/// Main error type for the orchestration core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session id is not present in the store
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Permission resolution for a call id that has no request in the session
    #[error("Unknown tool use {tool_use_id} in session {session_id}")]
    UnknownToolUse {
        /// Session the resolution was addressed to
        session_id: String,
        /// Call id that did not match
        tool_use_id: String,
    },

    /// Permission request was already resolved or cancelled
    #[error("Permission request {tool_use_id} was already resolved ({resolution})")]
    PermissionAlreadyResolved {
        /// Call id of the request
        tool_use_id: String,
        /// The resolution that stands
        resolution: Resolution,
    },

    /// A second permission request with the same call id
    #[error("Duplicate permission request: {0}")]
    DuplicatePermissionRequest(String),

    /// Session status change not allowed by the lifecycle
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Current status
        from: SessionStatus,
        /// Requested status
        to: SessionStatus,
    },

    /// Tool result whose call id never appeared as a tool use
    #[error("Tool result references unknown tool use: {0}")]
    OrphanToolResult(String),

    /// A turn is already running for this session
    #[error("Session {0} is already running")]
    SessionBusy(String),

    /// Agent runtime failure
    #[error("Agent runtime error: {0}")]
    Runtime(String),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Bridge protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound(session_id.into())
    }

    /// Create an unknown tool use error
    pub fn unknown_tool_use(session_id: impl Into<String>, tool_use_id: impl Into<String>) -> Self {
        Self::UnknownToolUse {
            session_id: session_id.into(),
            tool_use_id: tool_use_id.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a JSON decode error from a message
    pub fn json_decode(msg: impl Into<String>) -> Self {
        Self::JsonDecode(serde_json::Error::io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            msg.into(),
        )))
    }

    /// Whether this error is a bridge-level protocol violation rather than a
    /// failure of the core itself.
    ///
    /// Protocol violations are reported to the UI and leave session state
    /// untouched.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::UnknownToolUse { .. }
                | Self::PermissionAlreadyResolved { .. }
                | Self::DuplicatePermissionRequest(_)
                | Self::SessionBusy(_)
                | Self::Protocol(_)
        )
    }
}
