//! Transport Bridge protocol
//!
//! Commands flow from the UI to the core, events from the core to the UI.
//!
//! # Example: Decoding a command
//!
//! ```rust
//! use agent_cowork::control::{ClientCommand, ProtocolHandler};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = ProtocolHandler::new();
//! let command = handler.deserialize_command(
//!     r#"{"type":"session.history","payload":{"sessionId":"abc"}}"#,
//! )?;
//! assert!(matches!(command, ClientCommand::SessionHistory { .. }));
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Encoding an event
//!
//! ```rust
//! use agent_cowork::control::{ProtocolHandler, ServerEvent};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = ProtocolHandler::new();
//! let line = handler.serialize_event(&ServerEvent::error("Session not found: abc", None))?;
//! assert!(line.starts_with(r#"{"type":"error","payload":"#));
//! # Ok(())
//! # }
//! ```

mod handler;
mod messages;

// Re-export public types
pub use handler::ProtocolHandler;
pub use messages::{ClientCommand, ServerEvent};
