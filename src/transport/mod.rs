//! Line-delimited JSON transport to the agent runtime process
//!
//! [`ProcessRuntime`](crate::runtime::ProcessRuntime) drives one
//! [`SubprocessTransport`] per turn: the turn request and tool replies go out
//! as single lines on stdin, events come back as single lines on stdout.

pub mod subprocess;

use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::Result;

/// A bidirectional channel of JSON lines to one agent process
pub trait Transport: Send {
    /// Launch the process
    ///
    /// # Errors
    /// Returns error if the process cannot be started
    fn start(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send one JSON line; the newline is added here
    ///
    /// # Errors
    /// Returns error if the process is not running or its stdin is closed
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send;

    /// Close stdin, telling the process no more input follows
    ///
    /// # Errors
    /// Returns error if stdin cannot be shut down
    fn finish_input(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Take the stream of decoded stdout lines
    ///
    /// Can be taken once. The channel ends after the process exits; a failed
    /// exit is reported as a final error first.
    fn incoming(&mut self) -> mpsc::UnboundedReceiver<Result<Value>>;

    /// Whether the process was started and not shut down
    fn is_running(&self) -> bool;

    /// Stop the process, killing it if it does not exit in time
    ///
    /// # Errors
    /// Returns error if waiting on the process fails
    fn shutdown(&mut self) -> impl Future<Output = Result<()>> + Send;
}

pub use subprocess::{SubprocessConfig, SubprocessTransport};
