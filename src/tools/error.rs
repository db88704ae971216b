//! Tool-level errors
//!
//! These never cross the executor boundary: the registry renders them into a
//! failed [`ToolResult`](crate::types::messages::ToolResult) so the agent sees
//! the message and can adapt.

use thiserror::Error;

/// Failure of a single tool call
#[derive(Error, Debug)]
pub enum ToolError {
    /// Arguments do not match the tool's parameter schema
    #[error("Invalid arguments for {tool}: {detail}")]
    InvalidArguments {
        /// Tool name
        tool: String,
        /// What was wrong
        detail: String,
    },

    /// Path resolves outside the session's working directory
    #[error("Access denied: Path is outside the working directory ({cwd})")]
    AccessDenied {
        /// Working directory as shown to the agent
        cwd: String,
    },

    /// No executor registered under this name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Search API key missing from settings
    #[error("Tavily API key not configured. Please set it in Settings.")]
    MissingApiKey,

    /// Non-success HTTP response from an external API
    #[error("Tavily API error: {status} - {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Executor-specific failure, already phrased for the agent
    #[error("{0}")]
    Failed(String),

    /// The executor panicked
    #[error("Tool {tool} failed unexpectedly: {message}")]
    Panicked {
        /// Tool name
        tool: String,
        /// Panic payload, when it was a string
        message: String,
    },
}

impl ToolError {
    /// Create an invalid arguments error
    pub fn invalid_arguments(tool: impl Into<String>, detail: impl ToString) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            detail: detail.to_string(),
        }
    }

    /// Create a failure with a ready-made message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Whether the failure is a security refusal
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}
