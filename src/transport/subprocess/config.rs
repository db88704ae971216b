//! Launch settings for one agent process

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::{AgentCommand, DEFAULT_MAX_LINE_BYTES};

/// Variables that change how the child loads code; never forwarded
pub const BLOCKED_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
];

/// Number of stderr lines kept for exit diagnostics
pub const STDERR_TAIL_LINES: usize = 20;

/// How to launch one agent process
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// Program and arguments
    pub command: AgentCommand,
    /// Session working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment; [`BLOCKED_ENV_VARS`] are dropped
    pub env: HashMap<String, String>,
    /// Longest accepted stdout line, in bytes
    pub max_line_bytes: usize,
    /// Prefix for log lines (usually the session id)
    pub label: String,
}

impl SubprocessConfig {
    /// Launch `command` with the default line limit
    pub fn new(command: AgentCommand) -> Self {
        Self {
            command,
            cwd: None,
            env: HashMap::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            label: "agent".to_string(),
        }
    }
}
