//! Turn driver
//!
//! One task per running turn. It owns the turn's [`StreamAssembler`], feeds
//! it runtime events in arrival order, commits finished text blocks to the
//! Session Store, and spawns one task per tool call. Tool results are
//! appended and replied to the runtime in completion order.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::control::ServerEvent;
use crate::error::Result;
use crate::runtime::{RuntimeEvent, ToolReply, TurnHandle, TurnRequest};
use crate::stream::{BlockKind, BlockText, StreamAssembler};
use crate::tools::ToolError;
use crate::types::identifiers::{SessionId, ToolName, ToolUseId};
use crate::types::messages::{ContentBlock, Message, ToolResult};
use crate::types::session::SessionStatus;

use super::core::Shared;
use super::session::TurnOutcome;
use super::tool_call;

/// Result text for calls still open when their turn ends
const TURN_ENDED_MESSAGE: &str = "Tool call cancelled: the turn ended before it completed";

/// Run one turn to completion and record its outcome
pub(super) async fn drive(
    shared: Arc<Shared>,
    request: TurnRequest,
    generation: u64,
    cancel: CancellationToken,
) {
    let session_id = request.session_id.clone();
    let cwd = request.cwd.clone();
    shared.archive_session(&session_id).await;
    log::info!("[{session_id}] turn started");

    let started = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        started = shared.runtime.start_turn(request) => Some(started),
    };
    match started {
        None => settle(&shared, &session_id, generation, TurnOutcome::Stopped).await,
        Some(Err(e)) => {
            let outcome = TurnOutcome::Failed(e.to_string());
            settle(&shared, &session_id, generation, outcome).await;
        }
        Some(Ok(handle)) => {
            let mut turn = Turn::new(shared.clone(), session_id, generation, cwd, handle);
            let outcome = turn.run(&cancel).await;
            turn.finish(outcome).await;
        }
    }
}

/// Wait for the turn task; a panic fails the session instead of the process
pub(super) async fn supervise(
    shared: Arc<Shared>,
    session_id: SessionId,
    generation: u64,
    driver: JoinHandle<()>,
) {
    if let Err(e) = driver.await
        && e.is_panic()
    {
        log::error!("[{session_id}] turn task panicked");
        shared.gate.cancel_session(&session_id);
        if let Err(e) = shared.store.finish_assistant_message(&session_id) {
            log::debug!("[{session_id}] {e}");
        }
        if let Err(e) = shared.store.set_status(&session_id, SessionStatus::Error) {
            log::debug!("[{session_id}] {e}");
        }
        shared.release_turn(&session_id, generation);
        shared.emit_error(
            "Internal error: the turn ended unexpectedly",
            Some(session_id.clone()),
        );
        shared.emit_session(&session_id);
        return;
    }
    shared.release_turn(&session_id, generation);
}

/// Record the end of a turn: finalize the message, set the status, archive,
/// then release the session for its next turn and tell the UI
async fn settle(shared: &Shared, session_id: &SessionId, generation: u64, outcome: TurnOutcome) {
    if let Err(e) = shared.store.finish_assistant_message(session_id) {
        log::debug!("[{session_id}] {e}");
    }
    let status = match &outcome {
        TurnOutcome::Completed(_) => SessionStatus::Completed,
        TurnOutcome::Failed(_) => SessionStatus::Error,
        TurnOutcome::Stopped => SessionStatus::Idle,
    };
    if let Err(e) = shared.store.set_status(session_id, status) {
        log::debug!("[{session_id}] status not updated: {e}");
    }
    shared.archive_session(session_id).await;
    shared.release_turn(session_id, generation);
    log::info!("[{session_id}] turn ended: {status}");

    if let TurnOutcome::Failed(message) = outcome {
        log::warn!("[{session_id}] turn failed: {message}");
        shared.emit_error(message, Some(session_id.clone()));
    }
    shared.emit_session(session_id);
}

struct Turn {
    shared: Arc<Shared>,
    session_id: SessionId,
    generation: u64,
    cwd: PathBuf,
    events: mpsc::UnboundedReceiver<Result<RuntimeEvent>>,
    replies: mpsc::UnboundedSender<ToolReply>,
    assembler: StreamAssembler,
    calls: JoinSet<ToolReply>,
    unanswered: Vec<ToolUseId>,
}

impl Turn {
    fn new(
        shared: Arc<Shared>,
        session_id: SessionId,
        generation: u64,
        cwd: PathBuf,
        handle: TurnHandle,
    ) -> Self {
        let assembler = StreamAssembler::new(
            shared.partial_sender(&session_id),
            shared.config.flush_interval,
            shared.config.clear_grace,
        );
        Self {
            shared,
            session_id,
            generation,
            cwd,
            events: handle.events,
            replies: handle.replies,
            assembler,
            calls: JoinSet::new(),
            unanswered: Vec::new(),
        }
    }

    async fn run(&mut self, cancel: &CancellationToken) -> TurnOutcome {
        loop {
            let deadline = self.assembler.next_deadline();
            tokio::select! {
                biased;
                () = cancel.cancelled() => return TurnOutcome::Stopped,
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timer();
                }
                Some(joined) = self.calls.join_next(), if !self.calls.is_empty() => match joined {
                    Ok(reply) => self.deliver(reply),
                    // Call tasks catch their own panics; this is an abort.
                    Err(e) => log::debug!("[{}] tool task ended early: {e}", self.session_id),
                },
                event = self.events.recv() => match event {
                    Some(Ok(event)) => {
                        if let Some(outcome) = self.on_event(event) {
                            return outcome;
                        }
                    }
                    Some(Err(e)) => return TurnOutcome::Failed(e.to_string()),
                    None => {
                        return TurnOutcome::Failed(
                            "Agent runtime ended the turn without a result".to_string(),
                        );
                    }
                },
            }
        }
    }

    fn on_event(&mut self, event: RuntimeEvent) -> Option<TurnOutcome> {
        match event {
            RuntimeEvent::Stream { event, raw } => {
                self.shared
                    .emit(ServerEvent::stream_event(self.session_id.clone(), raw));
                if let Some(block) = self.assembler.apply(&event, Instant::now()) {
                    self.commit(block);
                }
                None
            }
            RuntimeEvent::ToolUse { id, name, input } => {
                // A tool use ends whatever block was streaming before it.
                if let Some(block) = self.assembler.block_stop(Instant::now()) {
                    self.commit(block);
                }
                self.start_call(id, name, input);
                None
            }
            RuntimeEvent::Completed { result } => Some(TurnOutcome::Completed(result)),
            RuntimeEvent::Failed { message } => Some(TurnOutcome::Failed(message)),
        }
    }

    fn on_timer(&mut self) {
        if let Some(block) = self.assembler.on_timer(Instant::now())
            && block.kind == BlockKind::Text
        {
            log::trace!("[{}] flush {} chars", self.session_id, block.text.len());
            self.store_op(|store, id| store.update_streaming_message(id, &block.text));
        }
    }

    /// Commit the final text of a block to the in-progress assistant message
    fn commit(&mut self, block: BlockText) {
        if block.kind != BlockKind::Text {
            return;
        }
        if !block.text.is_empty() {
            self.store_op(|store, id| store.update_streaming_message(id, &block.text));
        }
        self.store_op(|store, id| store.close_streaming_block(id));
        self.shared.emit_session(&self.session_id);
    }

    fn start_call(&mut self, id: ToolUseId, name: ToolName, input: serde_json::Value) {
        self.store_op(|store, session| {
            store.append_content_block(
                session,
                ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
            )
        });
        self.shared.emit_session(&self.session_id);

        if !self.shared.registry.contains(&name) {
            log::warn!("[{}] agent called unknown tool {name}", self.session_id);
            self.deliver(ToolReply {
                tool_use_id: id,
                result: ToolResult::err(ToolError::UnknownTool(name.to_string()).to_string()),
            });
            return;
        }

        self.unanswered.push(id.clone());
        self.calls.spawn(tool_call::run(
            self.shared.clone(),
            self.session_id.clone(),
            self.cwd.clone(),
            id,
            name,
            input,
        ));
    }

    /// Append a tool result and hand it back to the runtime
    fn deliver(&mut self, reply: ToolReply) {
        self.unanswered.retain(|id| id != &reply.tool_use_id);
        let message = Message::tool_result(reply.tool_use_id.clone(), reply.result.clone());
        self.store_op(|store, id| store.append_message(id, message));
        self.shared.emit_session(&self.session_id);
        if self.replies.send(reply).is_err() {
            log::debug!("[{}] runtime no longer accepts tool replies", self.session_id);
        }
    }

    /// Close out the turn after [`Turn::run`] returned
    async fn finish(mut self, outcome: TurnOutcome) {
        match outcome {
            TurnOutcome::Completed(_) => {
                if let Some(block) = self.assembler.block_stop(Instant::now()) {
                    self.commit(block);
                }
            }
            TurnOutcome::Failed(_) | TurnOutcome::Stopped => self.assembler.cancel(),
        }

        if !self.calls.is_empty() {
            self.shared.gate.cancel_session(&self.session_id);
            self.calls.shutdown().await;
        }
        for tool_use_id in std::mem::take(&mut self.unanswered) {
            let message = Message::tool_result(tool_use_id, ToolResult::err(TURN_ENDED_MESSAGE));
            self.store_op(|store, id| store.append_message(id, message));
        }

        let completed = matches!(outcome, TurnOutcome::Completed(_));
        settle(&self.shared, &self.session_id, self.generation, outcome).await;

        if completed {
            let Turn {
                mut assembler,
                events,
                replies,
                ..
            } = self;
            drop((events, replies));
            // The partial text lingers for its grace period.
            while let Some(deadline) = assembler.next_deadline() {
                sleep_until(deadline).await;
                assembler.on_timer(Instant::now());
            }
        }
    }

    /// Apply a store mutation; a missing session means it was deleted
    fn store_op(
        &self,
        op: impl FnOnce(&crate::store::SessionStore, &SessionId) -> Result<()>,
    ) {
        if let Err(e) = op(&self.shared.store, &self.session_id) {
            log::debug!("[{}] store update skipped: {e}", self.session_id);
        }
    }
}
