//! Agent process over piped stdio
//!
//! Spawns the configured agent command in the session's working directory.
//! Stdout is framed into lines and decoded as JSON; stderr goes to the log,
//! with its last lines kept to explain a failed exit.

mod command;
mod config;
mod lifecycle;
mod reader;
mod transport;

pub use config::{BLOCKED_ENV_VARS, SubprocessConfig};
pub use transport::SubprocessTransport;
