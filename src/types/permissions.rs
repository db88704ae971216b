//! Permission-related type definitions
//!
//! A [`PermissionRequest`] is the record shown to the user for a pending tool
//! call; a [`PermissionResult`] is what the user sends back; a [`Resolution`]
//! is the state the request ends up in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::{ToolName, ToolUseId};

// ============================================================================
// Permission Types
// ============================================================================

/// How long an allow decision lasts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllowScope {
    /// This call only
    #[default]
    Once,
    /// Every later call of the same tool in the same session
    Always,
}

/// Permission decision sent by the user over the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "camelCase")]
pub enum PermissionResult {
    /// Allow the tool use
    #[serde(rename_all = "camelCase")]
    Allow {
        /// Replacement arguments for the call
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_input: Option<serde_json::Value>,
        /// Once or always
        #[serde(default)]
        scope: AllowScope,
    },
    /// Deny the tool use
    Deny {
        /// Reason shown to the agent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl PermissionResult {
    /// Plain allow for this call only
    #[must_use]
    pub fn allow_once() -> Self {
        Self::Allow {
            updated_input: None,
            scope: AllowScope::Once,
        }
    }

    /// Allow this and every later call of the same tool
    #[must_use]
    pub fn allow_always() -> Self {
        Self::Allow {
            updated_input: None,
            scope: AllowScope::Always,
        }
    }

    /// Deny without a reason
    #[must_use]
    pub fn deny() -> Self {
        Self::Deny { message: None }
    }

    /// Resolution this decision applies to a request
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        match self {
            Self::Allow {
                scope: AllowScope::Once,
                ..
            } => Resolution::AllowOnce,
            Self::Allow {
                scope: AllowScope::Always,
                ..
            } => Resolution::AllowAlways,
            Self::Deny { .. } => Resolution::Deny,
        }
    }
}

/// State of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// Waiting for the user
    Unresolved,
    /// Allowed for this call
    AllowOnce,
    /// Allowed for this and later calls of the tool
    AllowAlways,
    /// Denied by the user
    Deny,
    /// Session deleted or turn aborted before a decision
    Cancelled,
}

impl Resolution {
    /// Whether the request still awaits a decision
    #[must_use]
    pub fn is_pending(self) -> bool {
        self == Self::Unresolved
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unresolved => "unresolved",
            Self::AllowOnce => "allow-once",
            Self::AllowAlways => "allow-always",
            Self::Deny => "deny",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A tool call waiting on (or past) a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Call id of the pending tool invocation
    pub tool_use_id: ToolUseId,
    /// Requested tool
    pub tool_name: ToolName,
    /// Arguments exactly as the agent sent them
    pub arguments: serde_json::Value,
    /// Capabilities the tool exercises (e.g. `fs-read`, `network`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Current state
    pub resolution: Resolution,
    /// When the request was recorded
    pub requested_at: DateTime<Utc>,
}

impl PermissionRequest {
    /// New unresolved request
    #[must_use]
    pub fn new(
        tool_use_id: ToolUseId,
        tool_name: ToolName,
        arguments: serde_json::Value,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            tool_use_id,
            tool_name,
            arguments,
            capabilities,
            resolution: Resolution::Unresolved,
            requested_at: Utc::now(),
        }
    }
}
