use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::Arc;

use super::tavily::{ExtractResponse, TavilyClient};
use super::{ExecutionContext, Tool, ToolCapabilities, ToolDefinition, ToolError, parse_args};

const NAME: &str = "ExtractPageContent";
const CONTENT_LIMIT: usize = 5000;

#[derive(Deserialize)]
struct ExtractArgs {
    urls: Vec<String>,
}

/// Full-page extraction through the Tavily API
pub struct ExtractPageContentTool {
    client: Arc<TavilyClient>,
}

impl ExtractPageContentTool {
    /// Tool backed by `client`
    pub fn new(client: Arc<TavilyClient>) -> Self {
        Self { client }
    }
}

fn format_pages(response: &ExtractResponse) -> String {
    let mut out = String::from("Extracted Page Content:\n\n");
    let mut n = 0;
    for page in &response.results {
        n += 1;
        let chars = page.raw_content.chars().count();
        let preview: String = page.raw_content.chars().take(CONTENT_LIMIT).collect();
        let truncated = if chars > CONTENT_LIMIT {
            "\n\n...[truncated]..."
        } else {
            ""
        };
        let _ = write!(
            out,
            "{n}. {}\n**Content** ({chars} characters):\n{preview}{truncated}\n\n---\n\n",
            page.url
        );
    }
    for failed in &response.failed_results {
        n += 1;
        let error = if failed.error.is_empty() {
            "Unknown error"
        } else {
            failed.error.as_str()
        };
        let _ = write!(out, "{n}. {}\n**Failed**: {error}\n\n---\n\n", failed.url);
    }
    out
}

#[async_trait]
impl Tool for ExtractPageContentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Extract full detailed content from specific web pages. Use AFTER \
                          WebSearch to get complete page content from URLs found in search \
                          results. Returns full page content in readable format. Best for deep \
                          analysis of specific pages and extracting structured data."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reasoning": {
                        "type": "string",
                        "description": "Why extract these specific pages"
                    },
                    "urls": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of URLs to extract full content from (1-5 URLs)",
                        "minItems": 1,
                        "maxItems": 5
                    }
                },
                "required": ["reasoning", "urls"]
            }),
        }
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities::NETWORK
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<String, ToolError> {
        let args: ExtractArgs = parse_args(NAME, args)?;
        log::info!("ExtractPageContent: {} url(s)", args.urls.len());
        let response = self
            .client
            .extract(ctx.credentials().tavily_api_key.as_deref(), &args.urls)
            .await?;
        log::debug!(
            "ExtractPageContent: {}/{} pages extracted",
            response.results.len(),
            args.urls.len()
        );
        Ok(format_pages(&response))
    }
}
