use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ExecutionContext, Tool, ToolCapabilities, ToolDefinition, ToolError, parse_args};

const NAME: &str = "Write";

#[derive(Deserialize)]
struct WriteArgs {
    file_path: String,
    content: String,
}

/// Create (or overwrite) a file inside the working directory
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Create a new file with the given content. Use this to create new files."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "explanation": {
                        "type": "string",
                        "description": "Why you're creating this file"
                    },
                    "file_path": {
                        "type": "string",
                        "description": "Path where to create the file"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["explanation", "file_path", "content"]
            }),
        }
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities::FS_WRITE
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<String, ToolError> {
        let args: WriteArgs = parse_args(NAME, args)?;
        let path = ctx.resolve_path(&args.file_path).await?;
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, args.content.as_bytes()).await
        };
        write
            .await
            .map_err(|e| ToolError::failed(format!("Failed to write file: {e}")))?;
        Ok(format!("File created: {}", args.file_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Credentials;

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(dir.path(), Credentials::default());
        let out = WriteTool
            .execute(
                json!({"explanation": "x", "file_path": "nested/dir/out.md", "content": "# hi"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out, "File created: nested/dir/out.md");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nested/dir/out.md")).unwrap(),
            "# hi"
        );
    }

    #[tokio::test]
    async fn refuses_to_write_outside() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir(&work).unwrap();
        let ctx = ExecutionContext::new(&work, Credentials::default());
        let err = WriteTool
            .execute(
                json!({"explanation": "x", "file_path": "../escape.txt", "content": "x"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.is_access_denied());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn refuses_to_write_through_a_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let outside = dir.path().join("outside");
        std::fs::create_dir(&work).unwrap();
        std::fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(outside.join("pwned.txt"), work.join("link")).unwrap();

        let ctx = ExecutionContext::new(&work, Credentials::default());
        let err = WriteTool
            .execute(
                json!({"explanation": "x", "file_path": "link", "content": "escaped"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.is_access_denied());
        assert!(!outside.join("pwned.txt").exists());
    }
}
