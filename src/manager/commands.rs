//! Bridge command handling

use std::path::PathBuf;

use crate::config::Settings;
use crate::control::{ClientCommand, ServerEvent};
use crate::error::{CoreError, Result};
use crate::runtime::TurnRequest;
use crate::types::identifiers::{SessionId, ToolUseId};
use crate::types::messages::Message;
use crate::types::permissions::PermissionResult;
use crate::types::session::{Session, SessionStatus, title_from_prompt};
use tokio_util::sync::CancellationToken;

use super::core::Orchestrator;
use super::session::ActiveTurn;
use super::turn;

impl Orchestrator {
    /// Handle one command from the UI
    ///
    /// Never fails: errors are reported as `error` events and leave session
    /// state unchanged.
    pub async fn handle_command(&self, command: ClientCommand) {
        let session_id = command_session(&command);
        if let Err(e) = self.dispatch(command).await {
            match &session_id {
                Some(id) => log::warn!("[{id}] command failed: {e}"),
                None => log::warn!("Command failed: {e}"),
            }
            self.shared.emit_error(e.to_string(), session_id);
        }
    }

    async fn dispatch(&self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::SessionStart { cwd, prompt, title } => {
                self.start_session(cwd, prompt, title).map(|_| ())
            }
            ClientCommand::SessionContinue { session_id, prompt } => {
                self.continue_session(&session_id, prompt).await
            }
            ClientCommand::SessionHistory { session_id } => {
                let session = self.load_history(&session_id).await?;
                self.shared.emit(ServerEvent::SessionHistory {
                    session_id,
                    status: session.status,
                    messages: session.messages,
                });
                Ok(())
            }
            ClientCommand::SessionDelete { session_id } => {
                self.delete_session(&session_id).await.map(|_| ())
            }
            ClientCommand::SessionStop { session_id } => self.stop_session(&session_id).await,
            ClientCommand::SessionList {} => {
                self.shared.emit(ServerEvent::SessionList {
                    sessions: self.shared.store.list(),
                });
                Ok(())
            }
            ClientCommand::PermissionResponse {
                session_id,
                tool_use_id,
                result,
            } => self.respond_to_permission(&session_id, &tool_use_id, result),
            ClientCommand::SettingsGet {} => {
                self.shared.emit(ServerEvent::SettingsLoaded {
                    settings: self.shared.settings.current(),
                });
                Ok(())
            }
            ClientCommand::SettingsSave { settings } => self.save_settings(settings).await.map(|_| ()),
        }
    }

    /// Create a session and start its first turn
    ///
    /// # Errors
    /// Returns error if the turn cannot be started
    pub fn start_session(
        &self,
        cwd: PathBuf,
        prompt: String,
        title: Option<String>,
    ) -> Result<SessionId> {
        let title = title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| title_from_prompt(&prompt));
        let session_id = self.shared.store.create_session(cwd, title);
        log::info!("[{session_id}] session started");
        self.begin_turn(&session_id, prompt)?;
        Ok(session_id)
    }

    /// Run another turn in an existing session
    ///
    /// Archived history is loaded first so the runtime sees the whole
    /// conversation.
    ///
    /// # Errors
    /// Returns error if the session does not exist or a turn is running
    pub async fn continue_session(&self, session_id: &SessionId, prompt: String) -> Result<()> {
        self.load_history(session_id).await?;
        self.begin_turn(session_id, prompt)
    }

    /// Full session with archived history loaded
    ///
    /// Hydration happens at most once; later calls return the in-memory
    /// history.
    ///
    /// # Errors
    /// Returns error if the session does not exist or its archive is unreadable
    pub async fn load_history(&self, session_id: &SessionId) -> Result<Session> {
        let session = self.shared.store.snapshot(session_id)?;
        if session.hydrated {
            return Ok(session);
        }
        let history = self
            .shared
            .archive
            .load(session_id)
            .await?
            .map(|archived| archived.messages)
            .unwrap_or_default();
        if self.shared.store.hydrate(session_id, history)? {
            log::debug!("[{session_id}] history hydrated");
        }
        self.shared.store.snapshot(session_id)
    }

    /// Abort the running turn, keeping the session
    ///
    /// Pending permission requests are cancelled; committed messages stay.
    ///
    /// # Errors
    /// Returns error if the session does not exist
    pub async fn stop_session(&self, session_id: &SessionId) -> Result<()> {
        if !self.shared.store.contains(session_id) {
            return Err(CoreError::session_not_found(session_id.as_str()));
        }
        let active = self.shared.turns.lock().remove(session_id);
        match active {
            Some(turn) => {
                log::info!("[{session_id}] stopping turn");
                turn.cancel.cancel();
                self.shared.gate.cancel_session(session_id);
                turn.stop().await;
            }
            None => self.shared.emit_session(session_id),
        }
        Ok(())
    }

    /// Delete a session, cancelling its turn and pending permission requests
    ///
    /// Returns the final state of the session.
    ///
    /// # Errors
    /// Returns error if the session does not exist
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<Session> {
        if !self.shared.store.contains(session_id) {
            return Err(CoreError::session_not_found(session_id.as_str()));
        }
        let active = self.shared.turns.lock().remove(session_id);
        if let Some(turn) = &active {
            turn.cancel.cancel();
        }
        let cancelled = self.shared.gate.cancel_session(session_id);
        if let Some(turn) = active {
            turn.stop().await;
        }

        let removed = self.shared.store.delete_session(session_id)?;
        self.shared.forget_partial(session_id);
        if let Err(e) = self.shared.archive.remove(session_id).await {
            log::warn!("[{session_id}] failed to remove archived session: {e}");
        }
        log::info!(
            "[{session_id}] session deleted ({} pending request(s) cancelled)",
            cancelled.len()
        );
        self.shared.emit(ServerEvent::SessionDeleted {
            session_id: session_id.clone(),
        });
        Ok(removed)
    }

    /// Apply a human decision to a pending permission request
    ///
    /// # Errors
    /// Returns error for an unknown session or call id, or a request that was
    /// already settled
    pub fn respond_to_permission(
        &self,
        session_id: &SessionId,
        tool_use_id: &ToolUseId,
        result: PermissionResult,
    ) -> Result<()> {
        self.shared.gate.resolve(session_id, tool_use_id, result)?;
        self.shared.emit_session(session_id);
        Ok(())
    }

    /// Persist settings and report the normalized result
    ///
    /// # Errors
    /// Returns error if the settings file cannot be written
    pub async fn save_settings(&self, settings: Settings) -> Result<Settings> {
        let saved = self.shared.settings.save(settings).await?;
        self.shared.emit(ServerEvent::SettingsLoaded {
            settings: saved.clone(),
        });
        Ok(saved)
    }

    /// Mark the session running, append the prompt and spawn the turn task
    fn begin_turn(&self, session_id: &SessionId, prompt: String) -> Result<()> {
        let shared = &self.shared;
        let mut turns = shared.turns.lock();
        let session = shared.store.snapshot(session_id)?;
        if turns.contains_key(session_id) || session.status == SessionStatus::Running {
            return Err(CoreError::SessionBusy(session_id.to_string()));
        }

        shared.store.set_status(session_id, SessionStatus::Running)?;
        shared.store.append_message(session_id, Message::user(prompt.clone()))?;
        let request = TurnRequest {
            session_id: session_id.clone(),
            cwd: session.cwd,
            prompt,
            history: session.messages,
            tools: shared.registry.definitions(),
            settings: shared.settings.current(),
        };

        let cancel = CancellationToken::new();
        let generation = shared.next_generation();
        let driver = tokio::spawn(turn::drive(
            shared.clone(),
            request,
            generation,
            cancel.clone(),
        ));
        let handle = tokio::spawn(turn::supervise(
            shared.clone(),
            session_id.clone(),
            generation,
            driver,
        ));
        turns.insert(
            session_id.clone(),
            ActiveTurn {
                generation,
                cancel,
                handle,
            },
        );
        drop(turns);

        shared.emit_session(session_id);
        Ok(())
    }
}

/// Session a command is addressed to, for error reporting
fn command_session(command: &ClientCommand) -> Option<SessionId> {
    match command {
        ClientCommand::SessionContinue { session_id, .. }
        | ClientCommand::SessionHistory { session_id }
        | ClientCommand::SessionDelete { session_id }
        | ClientCommand::SessionStop { session_id }
        | ClientCommand::PermissionResponse { session_id, .. } => Some(session_id.clone()),
        ClientCommand::SessionStart { .. }
        | ClientCommand::SessionList {}
        | ClientCommand::SettingsGet {}
        | ClientCommand::SettingsSave { .. } => None,
    }
}
