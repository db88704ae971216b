//! # agent_cowork
//!
//! Orchestration core of a desktop agent chat client. A UI process talks to
//! this crate over a line-delimited JSON bridge; the crate runs agent turns,
//! streams partial model output back, routes every tool call through a human
//! permission handshake, and keeps per-session conversation state consistent
//! while several sessions run at once.
//!
//! ## Quick Start
//!
//! Wire an [`Orchestrator`] to a runtime and a tool registry, then serve the
//! bridge on stdio:
//!
//! ```no_run
//! use agent_cowork::{CoreConfig, Orchestrator, ProcessRuntime, ToolRegistry};
//! use agent_cowork::control::run_stdio_bridge;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::from_env()?;
//!     let runtime = ProcessRuntime::new(config.agent_command.clone(), config.max_line_bytes);
//!     let max_line_bytes = config.max_line_bytes;
//!     let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let orchestrator = Orchestrator::new(
//!         config,
//!         Arc::new(runtime),
//!         Arc::new(ToolRegistry::with_builtin_tools()),
//!         events_tx,
//!     );
//!     orchestrator.restore().await?;
//!     run_stdio_bridge(&orchestrator, events_rx, max_line_bytes).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Driving it directly
//!
//! Tests and embedders can skip the bridge and send commands themselves. The
//! [`ScriptedRuntime`](runtime::ScriptedRuntime) replays prepared turns:
//!
//! ```no_run
//! use agent_cowork::control::{ClientCommand, ServerEvent};
//! use agent_cowork::runtime::{ScriptedRuntime, ScriptedTurn};
//! use agent_cowork::{CoreConfig, Orchestrator, ToolRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let runtime = ScriptedRuntime::with_turns([
//!     ScriptedTurn::new().text_block(&["Hel", "lo"]).complete(),
//! ]);
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let orchestrator = Orchestrator::new(
//!     CoreConfig::with_home("/tmp/agent-cowork"),
//!     Arc::new(runtime),
//!     Arc::new(ToolRegistry::with_builtin_tools()),
//!     events_tx,
//! );
//! orchestrator
//!     .handle_command(ClientCommand::SessionStart {
//!         cwd: "/work".into(),
//!         prompt: "Say hello".into(),
//!         title: None,
//!     })
//!     .await;
//! while let Some(event) = events_rx.recv().await {
//!     if let ServerEvent::SessionUpdated { session } = event {
//!         println!("{}: {}", session.title, session.status);
//!     }
//! }
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`stream`]: Stream Assembler, coalesced partial text and block commits
//! - [`permissions`]: Permission Gate, the correlation table of pending calls
//! - [`store`]: Session Store and the on-disk session archive
//! - [`tools`]: Tool Registry, Execution Context and the built-in tools
//! - [`runtime`]: agent runtime interface, scripted and subprocess runtimes
//! - [`transport`]: JSON-lines subprocess transport
//! - [`control`]: Transport Bridge protocol and stdio loop
//! - [`manager`]: the [`Orchestrator`] tying it together
//! - [`config`]: core configuration and persisted user settings
//! - [`types`]: identifiers, messages, permission and session records
//! - [`error`]: error types
//!
//! ## Error Handling
//!
//! Fallible core operations return [`Result<T, CoreError>`](Result). Tool
//! failures never surface as errors: the registry turns them into failed
//! tool results that go back into the conversation. Protocol errors reach
//! the UI as `error` events.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod control;
pub mod error;
pub mod manager;
pub mod permissions;
pub(crate) mod persist;
pub mod runtime;
pub mod store;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use config::{AgentCommand, CoreConfig, Settings, SettingsStore};
pub use control::{ClientCommand, ProtocolHandler, ServerEvent};
pub use error::{CoreError, Result};
pub use manager::Orchestrator;
pub use permissions::{GateDecision, PermissionGate};
pub use runtime::{AgentRuntime, ProcessRuntime, RuntimeEvent, TurnHandle, TurnRequest};
pub use store::{SessionArchive, SessionStore};
pub use stream::{PartialText, StreamAssembler, StreamEvent};
pub use tools::{ExecutionContext, Tool, ToolRegistry};
pub use transport::{SubprocessTransport, Transport};
pub use types::{
    ContentBlock, Message, PermissionRequest, PermissionResult, Resolution, Role, Session,
    SessionId, SessionStatus, ToolName, ToolResult, ToolUseId,
};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
