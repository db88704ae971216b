//! One tool call: permission, then execution

use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use crate::control::ServerEvent;
use crate::permissions::GateDecision;
use crate::runtime::ToolReply;
use crate::tools::{Credentials, ExecutionContext};
use crate::types::identifiers::{SessionId, ToolName, ToolUseId};
use crate::types::messages::ToolResult;

use super::core::Shared;

/// Result text for calls whose permission request was cancelled
const CANCELLED_MESSAGE: &str = "Tool call cancelled before permission was granted";

/// Ask the gate, run the tool if allowed, and produce the reply
///
/// Always yields a reply: refusals, cancellations and faults become failed
/// results.
pub(super) async fn run(
    shared: Arc<Shared>,
    session_id: SessionId,
    cwd: PathBuf,
    tool_use_id: ToolUseId,
    tool_name: ToolName,
    input: Value,
) -> ToolReply {
    let outcome = AssertUnwindSafe(call(&shared, &session_id, cwd, &tool_use_id, &tool_name, input))
        .catch_unwind()
        .await;
    let result = outcome.unwrap_or_else(|_| {
        log::error!("[{session_id}] tool call {tool_use_id} panicked");
        ToolResult::err(format!("Tool {tool_name} failed unexpectedly"))
    });
    ToolReply {
        tool_use_id,
        result,
    }
}

async fn call(
    shared: &Shared,
    session_id: &SessionId,
    cwd: PathBuf,
    tool_use_id: &ToolUseId,
    tool_name: &ToolName,
    input: Value,
) -> ToolResult {
    let capabilities = shared.registry.capabilities(tool_name).names();
    let decision = shared
        .gate
        .acquire(session_id, tool_use_id, tool_name, input, capabilities, |request| {
            shared.emit(ServerEvent::permission_request(session_id.clone(), request));
            shared.emit_session(session_id);
        })
        .await;

    match decision {
        Ok(GateDecision::Allowed { input }) => {
            // Credentials come from the settings in effect at execution time.
            let credentials = Credentials {
                tavily_api_key: shared.settings.current().tavily_api_key,
            };
            let ctx = ExecutionContext::new(cwd, credentials);
            log::info!("[{session_id}] executing {tool_name} ({tool_use_id})");
            shared.registry.execute(tool_name, input, &ctx).await
        }
        Ok(GateDecision::Denied { message }) => {
            log::info!("[{session_id}] {tool_name} ({tool_use_id}) denied");
            ToolResult::err(message)
        }
        Ok(GateDecision::Cancelled) => ToolResult::err(CANCELLED_MESSAGE),
        Err(e) => {
            log::warn!("[{session_id}] permission request for {tool_use_id} failed: {e}");
            ToolResult::err(e.to_string())
        }
    }
}
