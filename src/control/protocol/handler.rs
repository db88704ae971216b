//! Protocol handler for encoding and decoding bridge messages

use serde_json::Value;

use crate::error::{CoreError, Result};

use super::messages::{ClientCommand, ServerEvent};

/// Encodes and decodes bridge envelopes, one JSON object per line
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolHandler;

impl ProtocolHandler {
    /// Create a new protocol handler
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Serialize an event as one line, newline included
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn serialize_event(&self, event: &ServerEvent) -> Result<String> {
        let mut json = serde_json::to_string(event)?;
        json.push('\n');
        Ok(json)
    }

    /// Parse one command line
    ///
    /// A missing or `null` payload is treated as `{}` so payload-less
    /// commands like `{"type": "session.list"}` are accepted.
    ///
    /// # Errors
    /// Returns `CoreError::Protocol` if the line is not a known command
    pub fn deserialize_command(&self, line: &str) -> Result<ClientCommand> {
        let mut value: Value = serde_json::from_str(line)
            .map_err(|e| CoreError::protocol(format!("Invalid JSON: {e}")))?;
        let Value::Object(ref mut map) = value else {
            return Err(CoreError::protocol("Command must be a JSON object"));
        };
        if map.get("payload").is_none_or(Value::is_null) {
            map.insert("payload".to_string(), Value::Object(serde_json::Map::new()));
        }
        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        serde_json::from_value(value)
            .map_err(|e| CoreError::protocol(format!("Invalid command {kind}: {e}")))
    }

    /// Serialize a command (the UI side of the bridge)
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn serialize_command(&self, command: &ClientCommand) -> Result<String> {
        let mut json = serde_json::to_string(command)?;
        json.push('\n');
        Ok(json)
    }

    /// Parse one event line (the UI side of the bridge)
    ///
    /// # Errors
    /// Returns error if the line is not a known event
    pub fn deserialize_event(&self, line: &str) -> Result<ServerEvent> {
        serde_json::from_str(line)
            .map_err(|e| CoreError::protocol(format!("Invalid event: {e}")))
    }
}
