//! Shared harness for orchestrator integration tests

#![allow(dead_code)]

use agent_cowork::control::{ClientCommand, ServerEvent};
use agent_cowork::runtime::{ScriptedRuntime, ScriptedTurn};
use agent_cowork::{
    CoreConfig, Orchestrator, PermissionResult, Session, SessionId, SessionStatus, ToolRegistry,
    ToolUseId,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Orchestrator wired to a scripted runtime, with every event recorded
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub runtime: Arc<ScriptedRuntime>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    /// Every event received so far
    pub seen: Vec<ServerEvent>,
    /// Holds `home/` (settings, archive) and `work/` (session cwd)
    pub root: TempDir,
}

impl Harness {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("work")).unwrap();
        Self::open(root, turns)
    }

    fn open(root: TempDir, turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        let runtime = Arc::new(ScriptedRuntime::with_turns(turns));
        let (events_tx, events) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(
            CoreConfig::with_home(root.path().join("home")),
            runtime.clone(),
            Arc::new(ToolRegistry::with_builtin_tools()),
            events_tx,
        );
        Self {
            orchestrator,
            runtime,
            events,
            seen: Vec::new(),
            root,
        }
    }

    /// Simulate an application restart on the same data directory
    pub async fn reopen(self, turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        self.orchestrator.shutdown().await;
        let harness = Self::open(self.root, turns);
        harness.orchestrator.restore().await.unwrap();
        harness
    }

    pub fn workdir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn archive_file(&self, id: &SessionId) -> PathBuf {
        self.root
            .path()
            .join("home")
            .join("sessions")
            .join(format!("{id}.json"))
    }

    /// Start a session in the work directory
    pub fn start(&self, prompt: &str) -> SessionId {
        self.orchestrator
            .start_session(self.workdir(), prompt.to_string(), None)
            .unwrap()
    }

    pub async fn send(&self, command: ClientCommand) {
        self.orchestrator.handle_command(command).await;
    }

    pub async fn respond(&self, session_id: &SessionId, tool_use_id: &ToolUseId, result: PermissionResult) {
        self.send(ClientCommand::PermissionResponse {
            session_id: session_id.clone(),
            tool_use_id: tool_use_id.clone(),
            result,
        })
        .await;
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        let event = tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed");
        self.seen.push(event.clone());
        event
    }

    /// Receive events until `f` picks one
    pub async fn wait_for<T>(&mut self, mut f: impl FnMut(&ServerEvent) -> Option<T>) -> T {
        loop {
            let event = self.next_event().await;
            if let Some(value) = f(&event) {
                return value;
            }
        }
    }

    /// Wait until an update shows the session in `status`
    pub async fn wait_for_status(&mut self, session_id: &SessionId, status: SessionStatus) -> Session {
        self.wait_for(|event| match event {
            ServerEvent::SessionUpdated { session }
                if &session.id == session_id && session.status == status =>
            {
                Some(session.clone())
            }
            _ => None,
        })
        .await
    }

    /// Wait for the next permission prompt, returning its call id
    pub async fn wait_for_permission(&mut self) -> (ToolUseId, String) {
        self.wait_for(|event| match event {
            ServerEvent::PermissionRequest {
                tool_use_id,
                tool_name,
                ..
            } => Some((tool_use_id.clone(), tool_name.to_string())),
            _ => None,
        })
        .await
    }

    /// Wait for the next error event
    pub async fn wait_for_error(&mut self) -> (String, Option<SessionId>) {
        self.wait_for(|event| match event {
            ServerEvent::Error {
                message,
                session_id,
            } => Some((message.clone(), session_id.clone())),
            _ => None,
        })
        .await
    }

    pub fn permission_prompts(&self) -> usize {
        self.seen
            .iter()
            .filter(|event| matches!(event, ServerEvent::PermissionRequest { .. }))
            .count()
    }
}

/// Tool results recorded in a session, in order
pub fn tool_results(session: &Session) -> Vec<(ToolUseId, agent_cowork::ToolResult)> {
    session
        .messages
        .iter()
        .flat_map(|message| &message.content)
        .filter_map(|block| match block {
            agent_cowork::ContentBlock::ToolResult {
                tool_use_id,
                result,
            } => Some((tool_use_id.clone(), result.clone())),
            _ => None,
        })
        .collect()
}
