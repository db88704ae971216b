//! Decoding stdout lines of the agent process

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::error::{CoreError, Result};

use super::transport::SubprocessTransport;

/// How long to wait for stderr to drain after the process exited
const STDERR_SETTLE: Duration = Duration::from_millis(200);

impl SubprocessTransport {
    /// Spawn the reader task and hand out its channel
    ///
    /// The agent can sit idle for minutes while a permission prompt is open,
    /// so reads have no timeout. Lines that are not JSON or exceed the line
    /// limit are logged and skipped; only I/O failures and a failed exit end
    /// the stream with an error.
    pub(super) fn incoming_impl(&mut self) -> mpsc::UnboundedReceiver<Result<Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let Some(stdout) = self.stdout.take() else {
            let _ = tx.send(Err(CoreError::transport(
                "Agent runtime output is not available",
            )));
            return rx;
        };

        let label = self.config.label.clone();
        let max_line_bytes = self.config.max_line_bytes;
        let child = self.child.take();
        let stderr_task = self.stderr_task.take();
        let tail = self.stderr_tail.clone();
        let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(max_line_bytes));

        self.reader_task = Some(tokio::spawn(async move {
            while let Some(line) = lines.next().await {
                let value = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => match serde_json::from_str::<Value>(&line) {
                        Ok(value) => value,
                        Err(e) => {
                            log::warn!("[{label}] skipping non-JSON agent output: {e}");
                            continue;
                        }
                    },
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        log::warn!("[{label}] skipping agent output line over {max_line_bytes} bytes");
                        continue;
                    }
                    Err(LinesCodecError::Io(e)) => {
                        let _ = tx.send(Err(e.into()));
                        break;
                    }
                };
                if tx.send(Ok(value)).is_err() {
                    break;
                }
            }

            if let Some(child) = child
                && let Some(err) = exit_failure(child, stderr_task, &tail).await
            {
                let _ = tx.send(Err(err));
            }
        }));
        rx
    }
}

/// Wait for the process; a non-zero exit becomes an error naming the last
/// stderr line
async fn exit_failure(
    mut child: Child,
    stderr_task: Option<JoinHandle<()>>,
    tail: &Mutex<VecDeque<String>>,
) -> Option<CoreError> {
    let status = match child.wait().await {
        Ok(status) if status.success() => return None,
        Ok(status) => status,
        Err(e) => return Some(e.into()),
    };
    if let Some(task) = stderr_task {
        let _ = tokio::time::timeout(STDERR_SETTLE, task).await;
    }
    let mut message = format!("Agent runtime exited with {status}");
    if let Some(last) = tail.lock().iter().rev().find(|line| !line.trim().is_empty()) {
        message.push_str(": ");
        message.push_str(last.trim());
    }
    Some(CoreError::runtime(message))
}
