//! Type definitions for the orchestration core
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `ToolUseId`, `ToolName`)
//! - [`messages`] - Message, content block and tool result types
//! - [`permissions`] - Permission requests, decisions and resolutions
//! - [`session`] - Session records and lifecycle status

pub mod identifiers;
pub mod messages;
pub mod permissions;
pub mod session;

// Re-export commonly used types
pub use identifiers::{SessionId, ToolName, ToolUseId};
pub use messages::{ContentBlock, Message, Role, ToolResult};
pub use permissions::{AllowScope, PermissionRequest, PermissionResult, Resolution};
pub use session::{Session, SessionStatus, SessionSummary};
