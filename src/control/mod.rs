//! Transport Bridge
//!
//! - [`protocol`] - command/event envelopes and their codec
//! - `bridge` - the line-delimited JSON loop serving an [`Orchestrator`](crate::manager::Orchestrator)

mod bridge;
pub mod protocol;

pub use bridge::{run_bridge, run_stdio_bridge};
pub use protocol::{ClientCommand, ProtocolHandler, ServerEvent};
