use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::process::Stdio;
use tokio::process::Command;

use super::{ExecutionContext, Tool, ToolCapabilities, ToolDefinition, ToolError, parse_args};

const NAME: &str = "Glob";
const NO_FILES: &str = "No files found";

#[derive(Deserialize)]
struct GlobArgs {
    pattern: String,
}

/// Find files under the working directory by name or path pattern
pub struct GlobTool;

impl GlobTool {
    /// `find` arguments for a pattern; patterns with a `/` match whole paths
    fn find_args(pattern: &str) -> [String; 3] {
        if pattern.contains('/') {
            [
                ".".to_string(),
                "-path".to_string(),
                format!("./{}", pattern.trim_start_matches("./")),
            ]
        } else {
            [".".to_string(), "-name".to_string(), pattern.to_string()]
        }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Search for files matching a pattern. Use this to find files by name \
                          or extension."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "explanation": {
                        "type": "string",
                        "description": "What files you're looking for and why"
                    },
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern (e.g., '*.ts', 'src/**/*.js')"
                    }
                },
                "required": ["explanation", "pattern"]
            }),
        }
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities::FS_READ | ToolCapabilities::PROCESS
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<String, ToolError> {
        let args: GlobArgs = parse_args(NAME, args)?;
        let output = Command::new("find")
            .args(Self::find_args(&args.pattern))
            .current_dir(ctx.cwd())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::failed(format!("Glob search failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match output.status.code() {
            Some(0) if !stdout.trim().is_empty() => Ok(stdout.into_owned()),
            Some(0) | Some(1) => Ok(NO_FILES.to_string()),
            _ => Err(ToolError::failed(format!(
                "Glob search failed: {} {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}
