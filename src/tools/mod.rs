//! Tool Registry and built-in tools
//!
//! Each tool registers a stable name, a JSON-schema parameter descriptor and
//! an async executor. [`ToolRegistry::execute`] is the only way calls run: it
//! validates arguments, runs the executor, and turns every failure (including
//! a panic) into a failed [`ToolResult`]. Nothing raised inside a tool
//! reaches the turn.
//!
//! Built-in tools:
//! - `Read` / `Write` - files inside the session's working directory
//! - `Glob` - file search via `find`
//! - `WebSearch` / `ExtractPageContent` - Tavily API
//! - `AskUserQuestion` - clarification routed through the permission prompt

mod ask_user;
mod context;
mod error;
mod extract_page;
mod glob;
mod read;
mod tavily;
mod validation;
mod web_search;
mod write;

pub use ask_user::AskUserQuestionTool;
pub use context::{Credentials, ExecutionContext};
pub use error::ToolError;
pub use extract_page::ExtractPageContentTool;
pub use glob::GlobTool;
pub use read::ReadTool;
pub use tavily::{DEFAULT_TAVILY_BASE_URL, TavilyClient};
pub use validation::validate_arguments;
pub use web_search::WebSearchTool;
pub use write::WriteTool;

use async_trait::async_trait;
use bitflags::bitflags;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::types::identifiers::ToolName;
use crate::types::messages::ToolResult;

bitflags! {
    /// Side effects a tool may perform, shown with its permission request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ToolCapabilities: u8 {
        /// Reads files
        const FS_READ = 1 << 0;
        /// Creates or modifies files
        const FS_WRITE = 1 << 1;
        /// Makes outbound network calls
        const NETWORK = 1 << 2;
        /// Spawns processes
        const PROCESS = 1 << 3;
        /// Talks to the user
        const USER_INTERACTION = 1 << 4;
    }
}

impl ToolCapabilities {
    /// Wire names of the set flags
    #[must_use]
    pub fn names(self) -> Vec<String> {
        [
            (Self::FS_READ, "fs-read"),
            (Self::FS_WRITE, "fs-write"),
            (Self::NETWORK, "network"),
            (Self::PROCESS, "process"),
            (Self::USER_INTERACTION, "user-interaction"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name.to_string())
        .collect()
    }
}

/// What the agent runtime is told about a tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Stable tool name
    pub name: ToolName,
    /// What the tool does and when to use it
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// A tool executor
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameter schema
    fn definition(&self) -> ToolDefinition;

    /// Side effects of the tool
    fn capabilities(&self) -> ToolCapabilities;

    /// Run the tool with already-validated arguments
    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<String, ToolError>;
}

/// Deserialize validated arguments into a tool's typed argument struct
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    args: Value,
) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid_arguments(tool, e))
}

struct Registered {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
}

/// Name-keyed collection of tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Registered>,
}

impl ToolRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six built-in tools
    #[must_use]
    pub fn with_builtin_tools() -> Self {
        Self::with_builtin_tools_using(Arc::new(TavilyClient::new()))
    }

    /// Built-in tools with the web tools talking to `tavily`
    #[must_use]
    pub fn with_builtin_tools_using(tavily: Arc<TavilyClient>) -> Self {
        let mut registry = Self::new();
        registry.register(ReadTool);
        registry.register(WriteTool);
        registry.register(GlobTool);
        registry.register(WebSearchTool::new(tavily.clone()));
        registry.register(ExtractPageContentTool::new(tavily));
        registry.register(AskUserQuestionTool);
        registry
    }

    /// Add a tool, replacing any tool of the same name
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let definition = tool.definition();
        log::debug!("Registered tool {}", definition.name);
        self.tools.insert(
            definition.name.clone(),
            Registered {
                definition,
                tool: Arc::new(tool),
            },
        );
    }

    /// Whether a tool of this name exists
    #[must_use]
    pub fn contains(&self, name: &ToolName) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of every registered tool, sorted by name
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|entry| entry.definition.clone())
            .collect()
    }

    /// Capabilities of a tool, empty when unknown
    #[must_use]
    pub fn capabilities(&self, name: &ToolName) -> ToolCapabilities {
        self.tools
            .get(name)
            .map(|entry| entry.tool.capabilities())
            .unwrap_or_else(ToolCapabilities::empty)
    }

    /// Validate and run one call
    ///
    /// Never fails: every error becomes `ToolResult { success: false, .. }`.
    pub async fn execute(&self, name: &ToolName, args: Value, ctx: &ExecutionContext) -> ToolResult {
        match self.try_execute(name, args, ctx).await {
            Ok(output) => ToolResult::ok(output),
            Err(e) => {
                log::warn!("Tool {name} failed: {e}");
                ToolResult::err(e.to_string())
            }
        }
    }

    async fn try_execute(
        &self,
        name: &ToolName,
        args: Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        validate_arguments(&args, &entry.definition.parameters)
            .map_err(|detail| ToolError::invalid_arguments(name.as_str(), detail))?;

        match AssertUnwindSafe(entry.tool.execute(args, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(ToolError::Panicked {
                tool: name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
