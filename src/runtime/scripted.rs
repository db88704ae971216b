//! Scripted agent runtime
//!
//! Replays a queue of prepared turns. Each turn is a list of steps: emit an
//! event, wait for tool replies, pause, or hold until the turn is dropped.
//! Requests and replies are recorded for assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{CoreError, Result};
use crate::types::identifiers::ToolUseId;

use super::{AgentRuntime, RuntimeEvent, ToolReply, TurnHandle, TurnRequest};

/// One step of a scripted turn
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit an event
    Emit(RuntimeEvent),
    /// Emit a runtime-level error (not an event)
    Error(String),
    /// Wait until replies for all these calls arrived
    AwaitReplies(Vec<ToolUseId>),
    /// Sleep (on the tokio clock)
    Pause(Duration),
    /// Never finish; ends only when the consumer drops the turn
    Hold,
}

/// A prepared turn
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    steps: Vec<ScriptStep>,
}

impl ScriptedTurn {
    /// Empty turn
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw step
    #[must_use]
    pub fn step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Emit a raw stream event
    #[must_use]
    pub fn stream(self, raw: Value) -> Self {
        self.step(ScriptStep::Emit(RuntimeEvent::stream(raw)))
    }

    /// Emit a full text block: start, one delta per fragment, stop
    #[must_use]
    pub fn text_block(mut self, fragments: &[&str]) -> Self {
        self = self.stream(json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "text", "text": ""}
        }));
        for fragment in fragments {
            self = self.stream(json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": fragment}
            }));
        }
        self.stream(json!({"type": "content_block_stop", "index": 0}))
    }

    /// Emit a tool use
    #[must_use]
    pub fn tool_use(self, id: &str, name: &str, input: Value) -> Self {
        self.step(ScriptStep::Emit(RuntimeEvent::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }))
    }

    /// Wait for replies to these calls
    #[must_use]
    pub fn await_replies(self, ids: &[&str]) -> Self {
        self.step(ScriptStep::AwaitReplies(
            ids.iter().map(|id| ToolUseId::new(*id)).collect(),
        ))
    }

    /// Sleep
    #[must_use]
    pub fn pause(self, duration: Duration) -> Self {
        self.step(ScriptStep::Pause(duration))
    }

    /// Hold the turn open
    #[must_use]
    pub fn hold(self) -> Self {
        self.step(ScriptStep::Hold)
    }

    /// Finish normally
    #[must_use]
    pub fn complete(self) -> Self {
        self.step(ScriptStep::Emit(RuntimeEvent::Completed { result: None }))
    }

    /// Finish with a runtime failure event
    #[must_use]
    pub fn fail(self, message: &str) -> Self {
        self.step(ScriptStep::Emit(RuntimeEvent::Failed {
            message: message.to_string(),
        }))
    }
}

/// Runtime replaying [`ScriptedTurn`]s in order
#[derive(Default)]
pub struct ScriptedRuntime {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
    replies: Arc<Mutex<Vec<ToolReply>>>,
}

impl ScriptedRuntime {
    /// Runtime with no turns queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime with these turns queued
    #[must_use]
    pub fn with_turns(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        let runtime = Self::new();
        runtime.turns.lock().extend(turns);
        runtime
    }

    /// Queue another turn
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().push_back(turn);
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().clone()
    }

    /// Tool replies received so far, in arrival order
    #[must_use]
    pub fn replies(&self) -> Vec<ToolReply> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnHandle> {
        let turn = self
            .turns
            .lock()
            .pop_front()
            .ok_or_else(|| CoreError::runtime("No scripted turn left"))?;
        self.requests.lock().push(request);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (replies_tx, mut replies_rx) = mpsc::unbounded_channel::<ToolReply>();
        let recorded = self.replies.clone();

        tokio::spawn(async move {
            let mut received: HashSet<ToolUseId> = HashSet::new();
            for step in turn.steps {
                match step {
                    ScriptStep::Emit(event) => {
                        if events_tx.send(Ok(event)).is_err() {
                            return;
                        }
                    }
                    ScriptStep::Error(message) => {
                        if events_tx.send(Err(CoreError::runtime(message))).is_err() {
                            return;
                        }
                    }
                    ScriptStep::AwaitReplies(ids) => {
                        while !ids.iter().all(|id| received.contains(id)) {
                            tokio::select! {
                                reply = replies_rx.recv() => match reply {
                                    Some(reply) => {
                                        received.insert(reply.tool_use_id.clone());
                                        recorded.lock().push(reply);
                                    }
                                    None => return,
                                },
                                () = events_tx.closed() => return,
                            }
                        }
                    }
                    ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Hold => {
                        events_tx.closed().await;
                        return;
                    }
                }
            }
            // Keep recording late replies until the consumer lets go
            loop {
                tokio::select! {
                    reply = replies_rx.recv() => match reply {
                        Some(reply) => recorded.lock().push(reply),
                        None => return,
                    },
                    () = events_tx.closed() => return,
                }
            }
        });

        Ok(TurnHandle {
            events: events_rx,
            replies: replies_tx,
        })
    }
}
