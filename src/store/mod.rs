//! Session Store
//!
//! Process-wide keyed collection of [`Session`] records. Every operation takes
//! the lock once, mutates, and releases it without awaiting, so each call is a
//! single atomic step for the scheduler and readers only ever see whole
//! snapshots. Nothing outside this module writes session fields.
//!
//! - `archive` - durable per-session history files

mod archive;

pub use archive::SessionArchive;

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{CoreError, Result};
use crate::types::identifiers::{SessionId, ToolName, ToolUseId};
use crate::types::messages::{ContentBlock, Message, Role};
use crate::types::permissions::{PermissionRequest, Resolution};
use crate::types::session::{Session, SessionStatus, SessionSummary};

/// Keyed collection of sessions
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new idle session and return its id
    pub fn create_session(&self, cwd: PathBuf, title: String) -> SessionId {
        let id = SessionId::generate();
        let session = Session::new(id.clone(), cwd, title);
        self.sessions.write().insert(id.clone(), session);
        log::debug!("[{id}] session created");
        id
    }

    /// Insert a session loaded from the archive
    ///
    /// The in-memory copy starts without history; [`SessionStore::hydrate`]
    /// fills it in on first access.
    pub fn insert_archived(&self, mut session: Session) {
        session.messages.clear();
        session.hydrated = false;
        session.open_block = false;
        if session.status == SessionStatus::Running {
            // The process that ran this turn is gone.
            session.status = SessionStatus::Error;
        }
        session
            .permission_requests
            .iter_mut()
            .filter(|request| request.resolution.is_pending())
            .for_each(|request| request.resolution = Resolution::Cancelled);
        self.sessions
            .write()
            .entry(session.id.clone())
            .or_insert(session);
    }

    /// Remove a session, returning its final state
    ///
    /// Pending permission requests in the returned record are `cancelled`.
    /// Cancelling in-flight work is the caller's job.
    pub fn delete_session(&self, id: &SessionId) -> Result<Session> {
        let mut session = self
            .sessions
            .write()
            .remove(id)
            .ok_or_else(|| CoreError::session_not_found(id.as_str()))?;
        for request in &mut session.permission_requests {
            if request.resolution.is_pending() {
                request.resolution = Resolution::Cancelled;
            }
        }
        log::debug!("[{id}] session deleted");
        Ok(session)
    }

    /// Consistent copy of one session
    pub fn snapshot(&self, id: &SessionId) -> Result<Session> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::session_not_found(id.as_str()))
    }

    /// Whether the session exists
    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Summaries of every session, most recently updated first
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.sessions.read().values().map(Session::summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Append a finished message
    ///
    /// An assistant message still streaming at the tail is finalized first, so
    /// the new message lands after it. Tool results must reference a tool use
    /// that already appears in the session.
    pub fn append_message(&self, id: &SessionId, message: Message) -> Result<()> {
        self.with_session(id, |session| {
            for block in &message.content {
                if let ContentBlock::ToolResult { tool_use_id, .. } = block
                    && !has_tool_use(session, tool_use_id)
                {
                    return Err(CoreError::OrphanToolResult(tool_use_id.to_string()));
                }
            }
            finish_trailing(session);
            session.messages.push(message);
            Ok(())
        })
    }

    /// Append a non-text block (a tool use) to the in-progress assistant
    /// message, opening one if needed
    pub fn append_content_block(&self, id: &SessionId, block: ContentBlock) -> Result<()> {
        self.with_session(id, |session| {
            let message = streaming_tail(session);
            message.content.push(block);
            session.open_block = false;
            Ok(())
        })
    }

    /// Replace the text of the block currently being streamed
    ///
    /// Only the trailing in-progress assistant message is touched; if there is
    /// none, one is opened. Finalized messages are never reordered or copied.
    pub fn update_streaming_message(&self, id: &SessionId, text: &str) -> Result<()> {
        self.with_session(id, |session| {
            let open_block = session.open_block;
            let message = streaming_tail(session);
            match message.content.last_mut() {
                Some(ContentBlock::Text { text: current }) if open_block => {
                    current.clear();
                    current.push_str(text);
                }
                _ => message.content.push(ContentBlock::text(text)),
            }
            session.open_block = true;
            Ok(())
        })
    }

    /// Mark the streamed block as complete; the next update starts a new block
    pub fn close_streaming_block(&self, id: &SessionId) -> Result<()> {
        self.with_session(id, |session| {
            session.open_block = false;
            Ok(())
        })
    }

    /// Finalize the trailing assistant message, if one is streaming
    pub fn finish_assistant_message(&self, id: &SessionId) -> Result<()> {
        self.with_session(id, |session| {
            finish_trailing(session);
            Ok(())
        })
    }

    /// Record a new unresolved permission request
    pub fn record_permission_request(
        &self,
        id: &SessionId,
        request: PermissionRequest,
    ) -> Result<()> {
        self.with_session(id, |session| {
            if session
                .permission_requests
                .iter()
                .any(|existing| existing.tool_use_id == request.tool_use_id)
            {
                return Err(CoreError::DuplicatePermissionRequest(
                    request.tool_use_id.to_string(),
                ));
            }
            session.permission_requests.push(request);
            Ok(())
        })
    }

    /// Apply a human decision to a pending request
    ///
    /// At most one resolution is ever applied. `allow-always` also records the
    /// blanket approval for the tool in this session.
    pub fn resolve_permission_request(
        &self,
        id: &SessionId,
        tool_use_id: &ToolUseId,
        resolution: Resolution,
    ) -> Result<PermissionRequest> {
        self.with_session(id, |session| {
            let request = session
                .permission_requests
                .iter_mut()
                .find(|request| &request.tool_use_id == tool_use_id)
                .ok_or_else(|| CoreError::unknown_tool_use(id.as_str(), tool_use_id.as_str()))?;
            if !request.resolution.is_pending() {
                return Err(CoreError::PermissionAlreadyResolved {
                    tool_use_id: tool_use_id.to_string(),
                    resolution: request.resolution,
                });
            }
            request.resolution = resolution;
            let resolved = request.clone();
            if resolution == Resolution::AllowAlways {
                session.always_allowed.insert(resolved.tool_name.clone());
            }
            Ok(resolved)
        })
    }

    /// Cancel every pending request of the session, returning their call ids
    pub fn cancel_permission_requests(&self, id: &SessionId) -> Result<Vec<ToolUseId>> {
        self.with_session(id, |session| {
            let cancelled = session
                .permission_requests
                .iter_mut()
                .filter(|request| request.resolution.is_pending())
                .map(|request| {
                    request.resolution = Resolution::Cancelled;
                    request.tool_use_id.clone()
                })
                .collect();
            Ok(cancelled)
        })
    }

    /// Whether `tool` was approved with allow-always in this session
    pub fn is_always_allowed(&self, id: &SessionId, tool: &ToolName) -> Result<bool> {
        self.sessions
            .read()
            .get(id)
            .map(|session| session.always_allowed.contains(tool))
            .ok_or_else(|| CoreError::session_not_found(id.as_str()))
    }

    /// Move the session along its lifecycle
    pub fn set_status(&self, id: &SessionId, status: SessionStatus) -> Result<()> {
        self.with_session(id, |session| {
            if !session.status.can_transition_to(status) {
                return Err(CoreError::InvalidStatusTransition {
                    from: session.status,
                    to: status,
                });
            }
            log::debug!("[{id}] status {} -> {status}", session.status);
            session.status = status;
            Ok(())
        })
    }

    /// Load archived history into a session
    ///
    /// Returns `false` without touching anything when the session is already
    /// hydrated. Messages added since the session was listed stay after the
    /// archived ones.
    pub fn hydrate(&self, id: &SessionId, history: Vec<Message>) -> Result<bool> {
        self.with_session(id, |session| {
            if session.hydrated {
                return Ok(false);
            }
            let recent = std::mem::replace(&mut session.messages, history);
            session.messages.extend(recent);
            session.hydrated = true;
            Ok(true)
        })
    }

    /// Run `f` against one session under the write lock, bumping `updated_at`
    /// when it succeeds
    fn with_session<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| CoreError::session_not_found(id.as_str()))?;
        let value = f(session)?;
        session.updated_at = Utc::now();
        Ok(value)
    }
}

/// Trailing in-progress assistant message, opened if missing
fn streaming_tail(session: &mut Session) -> &mut Message {
    let needs_new = !matches!(
        session.messages.last(),
        Some(message) if message.role == Role::Assistant && message.streaming
    );
    if needs_new {
        session.messages.push(Message::streaming_assistant());
        session.open_block = false;
    }
    let last = session.messages.len() - 1;
    &mut session.messages[last]
}

fn finish_trailing(session: &mut Session) {
    if let Some(message) = session.messages.last_mut()
        && message.streaming
    {
        message.streaming = false;
    }
    session.open_block = false;
}

fn has_tool_use(session: &Session, tool_use_id: &ToolUseId) -> bool {
    session
        .messages
        .iter()
        .flat_map(Message::tool_use_ids)
        .any(|id| id == tool_use_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::messages::ToolResult;

    fn store_with_session() -> (SessionStore, SessionId) {
        let store = SessionStore::new();
        let id = store.create_session(PathBuf::from("/work"), "test".into());
        (store, id)
    }

    fn tool_use(id: &str, name: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: ToolUseId::new(id),
            name: ToolName::new(name),
            input: serde_json::json!({}),
        }
    }

    #[test]
    fn streaming_updates_replace_only_the_open_block() {
        let (store, id) = store_with_session();
        store.append_message(&id, Message::user("hi")).unwrap();

        store.update_streaming_message(&id, "He").unwrap();
        store.update_streaming_message(&id, "Hello").unwrap();
        store.close_streaming_block(&id).unwrap();
        store.update_streaming_message(&id, "Second").unwrap();

        let session = store.snapshot(&id).unwrap();
        assert_eq!(session.messages.len(), 2);
        let assistant = &session.messages[1];
        assert!(assistant.streaming);
        assert_eq!(
            assistant.content,
            vec![ContentBlock::text("Hello"), ContentBlock::text("Second")]
        );
    }

    #[test]
    fn appending_finalizes_streaming_message_in_place() {
        let (store, id) = store_with_session();
        store.update_streaming_message(&id, "partial").unwrap();
        store.append_content_block(&id, tool_use("c1", "Read")).unwrap();
        store
            .append_message(&id, Message::tool_result(ToolUseId::new("c1"), ToolResult::ok("x")))
            .unwrap();
        store.update_streaming_message(&id, "after").unwrap();

        let session = store.snapshot(&id).unwrap();
        assert_eq!(session.messages.len(), 3);
        assert!(!session.messages[0].streaming);
        assert_eq!(session.messages[0].text(), "partial");
        assert_eq!(session.messages[1].role, Role::Tool);
        assert_eq!(session.messages[2].text(), "after");
    }

    #[test]
    fn tool_result_without_tool_use_is_rejected() {
        let (store, id) = store_with_session();
        let err = store
            .append_message(
                &id,
                Message::tool_result(ToolUseId::new("ghost"), ToolResult::ok("x")),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::OrphanToolResult(_)));
        assert!(store.snapshot(&id).unwrap().messages.is_empty());
    }

    #[test]
    fn resolution_applies_at_most_once() {
        let (store, id) = store_with_session();
        let call = ToolUseId::new("c1");
        store
            .record_permission_request(
                &id,
                PermissionRequest::new(call.clone(), "Write".into(), serde_json::json!({}), vec![]),
            )
            .unwrap();

        store
            .resolve_permission_request(&id, &call, Resolution::Deny)
            .unwrap();
        let err = store
            .resolve_permission_request(&id, &call, Resolution::AllowOnce)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::PermissionAlreadyResolved {
                resolution: Resolution::Deny,
                ..
            }
        ));
        assert_eq!(
            store.snapshot(&id).unwrap().permission_requests[0].resolution,
            Resolution::Deny
        );
    }

    #[test]
    fn allow_always_records_blanket_approval() {
        let (store, id) = store_with_session();
        let call = ToolUseId::new("c1");
        store
            .record_permission_request(
                &id,
                PermissionRequest::new(call.clone(), "Glob".into(), serde_json::json!({}), vec![]),
            )
            .unwrap();
        assert!(!store.is_always_allowed(&id, &"Glob".into()).unwrap());
        store
            .resolve_permission_request(&id, &call, Resolution::AllowAlways)
            .unwrap();
        assert!(store.is_always_allowed(&id, &"Glob".into()).unwrap());
        assert!(!store.is_always_allowed(&id, &"Write".into()).unwrap());
    }

    #[test]
    fn delete_cancels_all_pending_requests() {
        let (store, id) = store_with_session();
        for n in 0..3 {
            store
                .record_permission_request(
                    &id,
                    PermissionRequest::new(
                        ToolUseId::new(format!("c{n}")),
                        "Write".into(),
                        serde_json::json!({}),
                        vec![],
                    ),
                )
                .unwrap();
        }
        let removed = store.delete_session(&id).unwrap();
        assert_eq!(removed.permission_requests.len(), 3);
        assert!(removed
            .permission_requests
            .iter()
            .all(|r| r.resolution == Resolution::Cancelled));
        assert!(matches!(
            store.snapshot(&id),
            Err(CoreError::SessionNotFound(_))
        ));
    }

    #[test]
    fn status_transitions_are_validated() {
        let (store, id) = store_with_session();
        assert!(store.set_status(&id, SessionStatus::Completed).is_err());
        store.set_status(&id, SessionStatus::Running).unwrap();
        store.set_status(&id, SessionStatus::Completed).unwrap();
        store.set_status(&id, SessionStatus::Running).unwrap();
        store.set_status(&id, SessionStatus::Error).unwrap();
        assert_eq!(store.snapshot(&id).unwrap().status, SessionStatus::Error);
    }

    #[test]
    fn hydrate_is_idempotent_and_keeps_recent_messages_last() {
        let store = SessionStore::new();
        let mut archived = Session::new(SessionId::new("s1"), PathBuf::from("/w"), "t".into());
        archived.messages.push(Message::user("old"));
        archived.status = SessionStatus::Completed;
        let id = archived.id.clone();
        store.insert_archived(archived);
        assert!(!store.snapshot(&id).unwrap().hydrated);

        store.append_message(&id, Message::user("new")).unwrap();
        assert!(store.hydrate(&id, vec![Message::user("old")]).unwrap());
        assert!(!store.hydrate(&id, vec![Message::user("again")]).unwrap());

        let session = store.snapshot(&id).unwrap();
        let texts: Vec<String> = session.messages.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["old", "new"]);
    }
}
