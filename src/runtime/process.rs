//! Agent runtime backed by a child process
//!
//! One process per turn. The turn request is written as the first line on
//! stdin, tool replies follow as they complete, and every stdout line is
//! parsed into a [`RuntimeEvent`]. The process is closed once the turn ends
//! or the consumer drops the handle.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::AgentCommand;
use crate::error::{CoreError, Result};
use crate::transport::{SubprocessConfig, SubprocessTransport, Transport};

use super::parser::{encode_reply, encode_turn, parse_event};
use super::{AgentRuntime, RuntimeEvent, ToolReply, TurnHandle, TurnRequest};

/// Runs the configured agent program for each turn
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    command: AgentCommand,
    max_line_bytes: usize,
}

impl ProcessRuntime {
    /// Runtime launching `command`
    pub fn new(command: AgentCommand, max_line_bytes: usize) -> Self {
        Self {
            command,
            max_line_bytes,
        }
    }
}

#[async_trait]
impl AgentRuntime for ProcessRuntime {
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnHandle> {
        let mut config = SubprocessConfig::new(self.command.clone());
        config.cwd = Some(request.cwd.clone());
        config.max_line_bytes = self.max_line_bytes;
        config.label = request.session_id.to_string();

        let mut transport = SubprocessTransport::new(config)?;
        transport.start().await?;
        transport.send_line(&encode_turn(&request)?).await?;
        let messages = transport.incoming();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let session_id = request.session_id.clone();

        tokio::spawn(async move {
            pump(&mut transport, messages, replies_rx, &events_tx).await;
            if let Err(e) = transport.shutdown().await {
                log::warn!("[{session_id}] closing agent runtime failed: {e}");
            }
            log::debug!("[{session_id}] agent runtime closed");
        });

        Ok(TurnHandle {
            events: events_rx,
            replies: replies_tx,
        })
    }
}

/// Move lines between the process and the turn until the turn ends
async fn pump(
    transport: &mut SubprocessTransport,
    mut messages: mpsc::UnboundedReceiver<Result<serde_json::Value>>,
    mut replies: mpsc::UnboundedReceiver<ToolReply>,
    events: &mpsc::UnboundedSender<Result<RuntimeEvent>>,
) {
    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Some(Ok(data)) => match parse_event(data) {
                    Ok(Some(event)) => {
                        let terminal = event.is_terminal();
                        if events.send(Ok(event)).is_err() || terminal {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if events.send(Err(e)).is_err() {
                            return;
                        }
                    }
                },
                Some(Err(e)) => {
                    let _ = events.send(Err(e));
                    return;
                }
                None => {
                    let _ = events.send(Err(CoreError::runtime(
                        "Agent runtime exited before finishing the turn",
                    )));
                    return;
                }
            },
            reply = replies.recv() => {
                let Some(reply) = reply else { return };
                let line = match encode_reply(&reply) {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = events.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = transport.send_line(&line).await {
                    let _ = events.send(Err(e));
                    return;
                }
            }
            () = events.closed() => return,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::stream::StreamEvent;
    use crate::types::messages::ToolResult;

    fn request(cwd: &std::path::Path) -> TurnRequest {
        TurnRequest {
            session_id: "s1".into(),
            cwd: cwd.to_path_buf(),
            prompt: "hello".into(),
            history: vec![],
            tools: vec![],
            settings: Settings::default(),
        }
    }

    fn script_runtime(dir: &std::path::Path, body: &str) -> ProcessRuntime {
        let script = dir.join("agent.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        let command = AgentCommand {
            program: "/bin/sh".into(),
            args: vec![script.display().to_string()],
        };
        ProcessRuntime::new(command, 1024 * 1024)
    }

    #[tokio::test]
    async fn exchanges_json_lines_with_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = script_runtime(
            dir.path(),
            r#"read turn
echo '{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}}'
echo '{"type":"tool_use","id":"c1","name":"Read","input":{}}'
read reply
case "$reply" in
  *'"toolUseId":"c1"'*) echo '{"type":"result","result":"ok"}' ;;
  *) echo '{"type":"error","message":"bad reply"}' ;;
esac"#,
        );
        let mut handle = runtime.start_turn(request(dir.path())).await.unwrap();

        match handle.events.recv().await.unwrap().unwrap() {
            RuntimeEvent::Stream { event, .. } => assert_eq!(
                event,
                StreamEvent::BlockDelta { index: 0, text: "Hi".into() }
            ),
            other => panic!("Expected stream event, got {other:?}"),
        }
        assert!(matches!(
            handle.events.recv().await.unwrap().unwrap(),
            RuntimeEvent::ToolUse { .. }
        ));
        handle
            .replies
            .send(ToolReply {
                tool_use_id: "c1".into(),
                result: ToolResult::ok("contents"),
            })
            .unwrap();
        assert_eq!(
            handle.events.recv().await.unwrap().unwrap(),
            RuntimeEvent::Completed { result: Some("ok".into()) }
        );
    }

    #[tokio::test]
    async fn early_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = script_runtime(dir.path(), "read turn\nexit 3");
        let mut handle = runtime.start_turn(request(dir.path())).await.unwrap();
        let err = handle.events.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::Runtime(_)));
    }

    #[tokio::test]
    async fn failed_exit_names_the_last_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = script_runtime(
            dir.path(),
            "read turn\necho 'not json'\necho 'model not configured' >&2\nexit 2",
        );
        let mut handle = runtime.start_turn(request(dir.path())).await.unwrap();
        let err = handle.events.recv().await.unwrap().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit status: 2"), "{message}");
        assert!(message.ends_with("model not configured"), "{message}");
    }
}
