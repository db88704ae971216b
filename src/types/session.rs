//! Session record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use super::identifiers::{SessionId, ToolName};
use super::messages::Message;
use super::permissions::PermissionRequest;

/// Maximum length of a derived session title
const TITLE_MAX_CHARS: usize = 60;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No turn has run, or the last one was stopped by the user
    #[default]
    Idle,
    /// A turn is in flight
    Running,
    /// The last turn failed
    Error,
    /// The last turn ended normally
    Completed,
}

impl SessionStatus {
    /// Whether the lifecycle allows moving from `self` to `next`
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionStatus::{Completed, Error, Idle, Running};
        matches!(
            (self, next),
            (Idle | Error | Completed, Running) | (Running, Completed | Error | Idle)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Error => "error",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Full state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique id
    pub id: SessionId,
    /// Human-readable title, derived from the first prompt
    pub title: String,
    /// Working directory tools are confined to
    pub cwd: PathBuf,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Conversation history
    pub messages: Vec<Message>,
    /// Permission requests of this session, pending and settled
    pub permission_requests: Vec<PermissionRequest>,
    /// Whether the full history is loaded in memory
    pub hydrated: bool,
    /// Tools approved with allow-always
    #[serde(default)]
    pub always_allowed: BTreeSet<ToolName>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Trailing assistant message ends in a text block still being streamed
    #[serde(skip)]
    pub(crate) open_block: bool,
}

impl Session {
    /// Fresh, hydrated, idle session
    #[must_use]
    pub fn new(id: SessionId, cwd: PathBuf, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            cwd,
            status: SessionStatus::Idle,
            messages: Vec::new(),
            permission_requests: Vec::new(),
            hydrated: true,
            always_allowed: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            open_block: false,
        }
    }

    /// Requests still waiting for a decision
    pub fn pending_permissions(&self) -> impl Iterator<Item = &PermissionRequest> {
        self.permission_requests
            .iter()
            .filter(|request| request.resolution.is_pending())
    }

    /// Lightweight listing entry
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            cwd: self.cwd.clone(),
            status: self.status,
            hydrated: self.hydrated,
            message_count: self.messages.len(),
            pending_permissions: self.pending_permissions().count(),
            updated_at: self.updated_at,
        }
    }
}

/// Session listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id
    pub id: SessionId,
    /// Title
    pub title: String,
    /// Working directory
    pub cwd: PathBuf,
    /// Status
    pub status: SessionStatus,
    /// Whether history is loaded
    pub hydrated: bool,
    /// Number of messages in memory
    pub message_count: usize,
    /// Number of unresolved permission requests
    pub pending_permissions: usize,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// Derive a session title from the opening prompt
#[must_use]
pub fn title_from_prompt(prompt: &str) -> String {
    let first_line = prompt.lines().map(str::trim).find(|l| !l.is_empty());
    match first_line {
        Some(line) if line.chars().count() > TITLE_MAX_CHARS => {
            let cut: String = line.chars().take(TITLE_MAX_CHARS).collect();
            format!("{}...", cut.trim_end())
        }
        Some(line) => line.to_string(),
        None => "New session".to_string(),
    }
}
