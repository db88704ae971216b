use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ExecutionContext, Tool, ToolCapabilities, ToolDefinition, ToolError, parse_args};

const NAME: &str = "AskUserQuestion";

#[derive(Deserialize)]
struct AskArgs {
    question: String,
    // Filled in by the user through the permission prompt.
    #[serde(default)]
    answer: Option<String>,
}

/// Ask the user for clarification
///
/// The question is shown in the permission prompt; the user's reply comes
/// back as `answer` in the updated input of the allow decision.
pub struct AskUserQuestionTool;

#[async_trait]
impl Tool for AskUserQuestionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Ask the user a question when you need clarification or more \
                          information."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The question to ask the user"
                    }
                },
                "required": ["question"]
            }),
        }
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities::USER_INTERACTION
    }

    async fn execute(&self, args: Value, _ctx: &ExecutionContext) -> Result<String, ToolError> {
        let args: AskArgs = parse_args(NAME, args)?;
        let mut output = format!("Question: {}", args.question);
        if let Some(answer) = args.answer.filter(|a| !a.trim().is_empty()) {
            output.push_str("\nAnswer: ");
            output.push_str(&answer);
        }
        Ok(output)
    }
}
