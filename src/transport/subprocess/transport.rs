//! Subprocess transport for the agent runtime

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{CoreError, Result};
use crate::transport::Transport;

use super::config::SubprocessConfig;

/// One agent process speaking JSON lines over stdio
pub struct SubprocessTransport {
    pub(super) config: SubprocessConfig,
    pub(super) program: PathBuf,
    pub(super) running: bool,
    /// Moves into the reader task once [`Transport::incoming`] is taken
    pub(super) child: Option<Child>,
    pub(super) stdin: Option<ChildStdin>,
    pub(super) stdout: Option<ChildStdout>,
    /// Last lines the process wrote to stderr
    pub(super) stderr_tail: Arc<Mutex<VecDeque<String>>>,
    pub(super) stderr_task: Option<JoinHandle<()>>,
    pub(super) reader_task: Option<JoinHandle<()>>,
}

impl SubprocessTransport {
    /// Transport for `config`, not yet started
    ///
    /// # Errors
    /// Returns error if the program cannot be found
    pub fn new(config: SubprocessConfig) -> Result<Self> {
        let program = Self::find_program(&config.command.program)?;
        Ok(Self {
            config,
            program,
            running: false,
            child: None,
            stdin: None,
            stdout: None,
            stderr_tail: Arc::new(Mutex::new(VecDeque::new())),
            stderr_task: None,
            reader_task: None,
        })
    }

    /// Resolve the agent program
    ///
    /// Names with a path separator are used as given; bare names are looked
    /// up on `PATH`.
    ///
    /// # Errors
    /// Returns error if the program does not exist
    pub fn find_program(program: &str) -> Result<PathBuf> {
        let path = Path::new(program);
        if path.components().count() > 1 {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
        } else if let Ok(found) = which::which(program) {
            return Ok(found);
        }
        Err(CoreError::runtime(format!("Agent runtime not found: {program}")))
    }
}

impl Transport for SubprocessTransport {
    async fn start(&mut self) -> Result<()> {
        self.start_impl().await
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        if !self.running {
            return Err(CoreError::transport("Agent runtime is not running"));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CoreError::transport("Agent runtime input is closed"))?;

        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');
        stdin
            .write_all(&framed)
            .await
            .map_err(|e| CoreError::transport(format!("Failed to write to agent runtime: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| CoreError::transport(format!("Failed to write to agent runtime: {e}")))
    }

    async fn finish_input(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| CoreError::transport(format!("Failed to close agent input: {e}")))?;
        }
        Ok(())
    }

    fn incoming(&mut self) -> mpsc::UnboundedReceiver<Result<Value>> {
        self.incoming_impl()
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.shutdown_impl().await
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        self.drop_impl();
    }
}
