use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ExecutionContext, Tool, ToolCapabilities, ToolDefinition, ToolError, parse_args};

const NAME: &str = "Read";

#[derive(Deserialize)]
struct ReadArgs {
    file_path: String,
}

/// Read a UTF-8 file inside the working directory
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Read the contents of a file. Use this to view file contents before \
                          editing or analyzing code."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "explanation": {
                        "type": "string",
                        "description": "Why you need to read this file"
                    },
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to read (relative or absolute)"
                    }
                },
                "required": ["explanation", "file_path"]
            }),
        }
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities::FS_READ
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<String, ToolError> {
        let args: ReadArgs = parse_args(NAME, args)?;
        let path = ctx.resolve_path(&args.file_path).await?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::failed(format!("Failed to read file: {e}")))
    }
}
