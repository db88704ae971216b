//! Session orchestration
//!
//! Provides `Orchestrator`, which dispatches bridge commands, runs one turn
//! task per running session, routes tool calls through the Permission Gate,
//! and reports progress as bridge events.
//!
//! # Module Structure
//!
//! - `core` - `Orchestrator` struct, startup and shutdown
//! - `commands` - command dispatch and the public session operations
//! - `turn` - per-turn driver and its supervisor
//! - `tool_call` - permission then execution for one tool call
//! - `session` - turn bookkeeping types

mod commands;
mod core;
mod session;
mod tool_call;
mod turn;

pub use self::core::Orchestrator;
