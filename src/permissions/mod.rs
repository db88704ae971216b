//! Permission Gate
//!
//! Mediates human approval of tool calls. Each pending call has an entry in a
//! correlation table (`(session, call id) -> oneshot sender`); the task that
//! asked for permission awaits the receiving half, so waiting never blocks the
//! thread and cancellation is an explicit message rather than a dropped future.
//!
//! While a request for tool `T` is outstanding in a session, further calls of
//! `T` in that session queue behind it. Once it settles they re-check the
//! session's allow-always set, so approving the first call with allow-always
//! lets the queued ones through without prompting again.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{CoreError, Result};
use crate::store::SessionStore;
use crate::types::identifiers::{SessionId, ToolName, ToolUseId};
use crate::types::permissions::{PermissionRequest, PermissionResult, Resolution};

/// Message used when the user denies without a reason
pub const DEFAULT_DENY_MESSAGE: &str = "Permission denied by user";

/// Outcome of asking the gate for a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Execute with these arguments
    Allowed {
        /// Arguments to execute with (possibly replaced by the user)
        input: Value,
    },
    /// The user refused
    Denied {
        /// Reason reported to the agent
        message: String,
    },
    /// Session deleted or turn aborted before a decision
    Cancelled,
}

/// Wake-up for calls queued behind an outstanding request
enum QueueWake {
    Retry,
    Cancelled,
}

struct Waiter {
    tool_name: ToolName,
    tx: oneshot::Sender<GateDecision>,
}

#[derive(Default)]
struct GateState {
    waiters: HashMap<(SessionId, ToolUseId), Waiter>,
    queued: HashMap<(SessionId, ToolName), Vec<oneshot::Sender<QueueWake>>>,
}

enum Wait {
    Own(oneshot::Receiver<GateDecision>, PermissionRequest),
    Queued(oneshot::Receiver<QueueWake>),
}

/// Correlation table between pending tool calls and human decisions
pub struct PermissionGate {
    store: Arc<SessionStore>,
    state: Mutex<GateState>,
}

impl PermissionGate {
    /// Gate recording its requests in `store`
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Ask permission for one tool call
    ///
    /// Returns immediately with `Allowed` when the tool was approved with
    /// allow-always earlier in the session. Otherwise a pending request is
    /// recorded, `on_request` is called with it (to notify the user), and the
    /// call waits for [`PermissionGate::resolve`] or
    /// [`PermissionGate::cancel_session`].
    ///
    /// # Errors
    /// Returns error if the session does not exist or the call id already has
    /// a request
    pub async fn acquire(
        &self,
        session_id: &SessionId,
        tool_use_id: &ToolUseId,
        tool_name: &ToolName,
        input: Value,
        capabilities: Vec<String>,
        on_request: impl FnOnce(&PermissionRequest),
    ) -> Result<GateDecision> {
        let mut on_request = Some(on_request);
        loop {
            let wait = {
                let mut state = self.state.lock();
                if self.store.is_always_allowed(session_id, tool_name)? {
                    log::debug!("[{session_id}] {tool_name} pre-approved for {tool_use_id}");
                    return Ok(GateDecision::Allowed { input });
                }
                let key = (session_id.clone(), tool_name.clone());
                if let Some(queue) = state.queued.get_mut(&key) {
                    let (tx, rx) = oneshot::channel();
                    queue.push(tx);
                    Wait::Queued(rx)
                } else {
                    let request = PermissionRequest::new(
                        tool_use_id.clone(),
                        tool_name.clone(),
                        input.clone(),
                        capabilities.clone(),
                    );
                    self.store
                        .record_permission_request(session_id, request.clone())?;
                    let (tx, rx) = oneshot::channel();
                    state.waiters.insert(
                        (session_id.clone(), tool_use_id.clone()),
                        Waiter {
                            tool_name: tool_name.clone(),
                            tx,
                        },
                    );
                    state.queued.insert(key, Vec::new());
                    Wait::Own(rx, request)
                }
            };

            match wait {
                Wait::Own(rx, request) => {
                    log::info!("[{session_id}] permission requested for {tool_name} ({tool_use_id})");
                    if let Some(notify) = on_request.take() {
                        notify(&request);
                    }
                    return Ok(rx.await.unwrap_or(GateDecision::Cancelled));
                }
                Wait::Queued(rx) => match rx.await {
                    Ok(QueueWake::Retry) => continue,
                    Ok(QueueWake::Cancelled) | Err(_) => return Ok(GateDecision::Cancelled),
                },
            }
        }
    }

    /// Apply a human decision
    ///
    /// The store enforces at-most-once: an unknown call id or an already
    /// settled request is an error and nothing changes.
    pub fn resolve(
        &self,
        session_id: &SessionId,
        tool_use_id: &ToolUseId,
        result: PermissionResult,
    ) -> Result<PermissionRequest> {
        let mut state = self.state.lock();
        let resolved =
            self.store
                .resolve_permission_request(session_id, tool_use_id, result.resolution())?;
        log::info!(
            "[{session_id}] {} {} ({tool_use_id})",
            resolved.resolution,
            resolved.tool_name
        );

        let decision = match result {
            PermissionResult::Allow { updated_input, .. } => GateDecision::Allowed {
                input: updated_input.unwrap_or_else(|| resolved.arguments.clone()),
            },
            PermissionResult::Deny { message } => GateDecision::Denied {
                message: message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DENY_MESSAGE.to_string()),
            },
        };

        if let Some(waiter) = state
            .waiters
            .remove(&(session_id.clone(), tool_use_id.clone()))
        {
            // The waiting task may be gone if its turn was aborted.
            let _ = waiter.tx.send(decision);
        }
        if let Some(queue) = state
            .queued
            .remove(&(session_id.clone(), resolved.tool_name.clone()))
        {
            for tx in queue {
                let _ = tx.send(QueueWake::Retry);
            }
        }
        Ok(resolved)
    }

    /// Cancel every pending request of a session
    ///
    /// Pending records become `cancelled` (when the session still exists) and
    /// every waiter, queued or not, observes [`GateDecision::Cancelled`].
    /// Returns the call ids whose requests were cancelled.
    pub fn cancel_session(&self, session_id: &SessionId) -> Vec<ToolUseId> {
        let mut state = self.state.lock();
        let cancelled = match self.store.cancel_permission_requests(session_id) {
            Ok(ids) => ids,
            Err(CoreError::SessionNotFound(_)) => Vec::new(),
            Err(e) => {
                log::warn!("[{session_id}] failed to cancel permission requests: {e}");
                Vec::new()
            }
        };

        let keys: Vec<_> = state
            .waiters
            .keys()
            .filter(|(session, _)| session == session_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(waiter) = state.waiters.remove(&key) {
                log::debug!("[{session_id}] cancelled waiter for {} ({})", waiter.tool_name, key.1);
                let _ = waiter.tx.send(GateDecision::Cancelled);
            }
        }
        state.queued.retain(|(session, _), queue| {
            if session != session_id {
                return true;
            }
            for tx in queue.drain(..) {
                let _ = tx.send(QueueWake::Cancelled);
            }
            false
        });

        if !cancelled.is_empty() {
            log::info!("[{session_id}] cancelled {} pending permission request(s)", cancelled.len());
        }
        cancelled
    }

    /// Number of calls awaiting a decision across all sessions
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Resolution currently recorded for a call
    pub fn resolution_of(&self, session_id: &SessionId, tool_use_id: &ToolUseId) -> Result<Resolution> {
        self.store
            .snapshot(session_id)?
            .permission_requests
            .iter()
            .find(|request| &request.tool_use_id == tool_use_id)
            .map(|request| request.resolution)
            .ok_or_else(|| CoreError::unknown_tool_use(session_id.as_str(), tool_use_id.as_str()))
    }
}
