//! Orchestrator structure, startup and shutdown

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};

use crate::config::{CoreConfig, SettingsStore};
use crate::control::ServerEvent;
use crate::error::Result;
use crate::permissions::PermissionGate;
use crate::runtime::AgentRuntime;
use crate::store::{SessionArchive, SessionStore};
use crate::stream::PartialText;
use crate::tools::ToolRegistry;
use crate::types::identifiers::SessionId;
use crate::types::session::Session;

use super::session::ActiveTurn;

/// State shared between the orchestrator and its turn tasks
pub(super) struct Shared {
    pub config: CoreConfig,
    pub runtime: Arc<dyn AgentRuntime>,
    pub registry: Arc<ToolRegistry>,
    pub store: Arc<SessionStore>,
    pub gate: PermissionGate,
    pub settings: SettingsStore,
    pub archive: SessionArchive,
    pub turns: Mutex<HashMap<SessionId, ActiveTurn>>,
    partials: Mutex<HashMap<SessionId, Arc<watch::Sender<PartialText>>>>,
    events: mpsc::UnboundedSender<ServerEvent>,
    next_generation: AtomicU64,
}

impl Shared {
    /// Send an event to the UI
    pub fn emit(&self, event: ServerEvent) {
        if self.events.send(event).is_err() {
            log::trace!("Event dropped: bridge receiver is gone");
        }
    }

    /// Send a fresh snapshot of the session, if it still exists
    pub fn emit_session(&self, session_id: &SessionId) {
        match self.store.snapshot(session_id) {
            Ok(session) => self.emit(ServerEvent::SessionUpdated { session }),
            Err(e) => log::debug!("[{session_id}] no snapshot to publish: {e}"),
        }
    }

    /// Send an error event
    pub fn emit_error(&self, message: impl Into<String>, session_id: Option<SessionId>) {
        self.emit(ServerEvent::error(message, session_id));
    }

    /// Partial-text channel of a session, created on first use
    pub fn partial_sender(&self, session_id: &SessionId) -> Arc<watch::Sender<PartialText>> {
        self.partials
            .lock()
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(watch::channel(PartialText::default()).0))
            .clone()
    }

    /// Drop the partial-text channel of a removed session
    pub fn forget_partial(&self, session_id: &SessionId) {
        self.partials.lock().remove(session_id);
    }

    /// Persist the session's current state
    pub async fn archive_session(&self, session_id: &SessionId) {
        let Ok(session) = self.store.snapshot(session_id) else {
            return;
        };
        if !session.hydrated {
            // Saving now would drop the history that is still on disk.
            return;
        }
        if let Err(e) = self.archive.save(&session).await {
            log::warn!("[{session_id}] failed to archive session: {e}");
        }
    }

    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Forget the session's turn entry if it still belongs to `generation`
    pub fn release_turn(&self, session_id: &SessionId, generation: u64) {
        let mut turns = self.turns.lock();
        if turns
            .get(session_id)
            .is_some_and(|turn| turn.generation == generation)
        {
            turns.remove(session_id);
        }
    }
}

/// Coordinates sessions, turns, permissions and tools
///
/// The orchestrator owns the Session Store and Permission Gate, runs one
/// turn task per running session, and reports everything the UI needs as
/// [`ServerEvent`]s on the channel given to [`Orchestrator::new`].
pub struct Orchestrator {
    pub(super) shared: Arc<Shared>,
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// Call [`Orchestrator::restore`] to load persisted settings and sessions.
    pub fn new(
        config: CoreConfig,
        runtime: Arc<dyn AgentRuntime>,
        registry: Arc<ToolRegistry>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let shared = Shared {
            gate: PermissionGate::new(store.clone()),
            settings: SettingsStore::new(&config.settings_path),
            archive: SessionArchive::new(&config.archive_dir),
            config,
            runtime,
            registry,
            store,
            turns: Mutex::new(HashMap::new()),
            partials: Mutex::new(HashMap::new()),
            events,
            next_generation: AtomicU64::new(0),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Load settings and list archived sessions
    ///
    /// Unreadable settings fall back to defaults. Archived sessions are
    /// inserted without history; `session.history` hydrates them.
    ///
    /// # Errors
    /// Returns error if the archive directory cannot be read
    pub async fn restore(&self) -> Result<usize> {
        if let Err(e) = self.shared.settings.load().await {
            log::warn!("Failed to load settings, using defaults: {e}");
        }
        let sessions = self.shared.archive.load_all().await?;
        let count = sessions.len();
        for session in sessions {
            self.shared.store.insert_archived(session);
        }
        log::info!("Restored {count} archived session(s)");
        Ok(count)
    }

    /// Consistent snapshot of one session
    ///
    /// # Errors
    /// Returns error if the session does not exist
    pub fn session(&self, session_id: &SessionId) -> Result<Session> {
        self.shared.store.snapshot(session_id)
    }

    /// The Session Store
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.shared.store
    }

    /// Watch the coalesced partial text of a session
    #[must_use]
    pub fn partial_text(&self, session_id: &SessionId) -> Option<watch::Receiver<PartialText>> {
        if !self.shared.store.contains(session_id) {
            return None;
        }
        Some(self.shared.partial_sender(session_id).subscribe())
    }

    /// Whether a turn is running for the session
    #[must_use]
    pub fn is_running(&self, session_id: &SessionId) -> bool {
        self.shared.turns.lock().contains_key(session_id)
    }

    /// Send an event to the UI on behalf of the bridge
    pub fn notify(&self, event: ServerEvent) {
        self.shared.emit(event);
    }

    /// Cancel every running turn and wait for them to settle
    pub async fn shutdown(&self) {
        log::info!("Shutting down orchestrator...");
        let turns: Vec<(SessionId, ActiveTurn)> = self.shared.turns.lock().drain().collect();
        for (session_id, turn) in turns {
            log::debug!("[{session_id}] stopping turn");
            turn.cancel.cancel();
            self.shared.gate.cancel_session(&session_id);
            turn.stop().await;
        }
        log::info!("Orchestrator shutdown complete");
    }
}
