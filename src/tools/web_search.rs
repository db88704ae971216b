use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::Arc;

use super::tavily::{SearchHit, TavilyClient};
use super::{ExecutionContext, Tool, ToolCapabilities, ToolDefinition, ToolError, parse_args};

const NAME: &str = "WebSearch";
const DEFAULT_MAX_RESULTS: u64 = 5;
const SNIPPET_CHARS: usize = 200;

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<f64>,
}

/// Web search through the Tavily API
pub struct WebSearchTool {
    client: Arc<TavilyClient>,
}

impl WebSearchTool {
    /// Tool backed by `client`
    pub fn new(client: Arc<TavilyClient>) -> Self {
        Self { client }
    }
}

fn format_results(hits: &[SearchHit]) -> String {
    let mut out = String::from("Search Results:\n\n");
    for (i, hit) in hits.iter().enumerate() {
        let snippet: String = hit.content.chars().take(SNIPPET_CHARS).collect();
        let ellipsis = if hit.content.chars().count() > SNIPPET_CHARS {
            "..."
        } else {
            ""
        };
        let _ = write!(
            out,
            "{}. **{}**\n   URL: {}\n   {snippet}{ellipsis}\n\n",
            i + 1,
            hit.title,
            hit.url
        );
    }
    out
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Search the web for real-time information - USE AS LAST RESORT. ALWAYS \
                          try Grep, Glob, and Read tools FIRST before using this tool. This tool \
                          searches the INTERNET, not your local repository. Use ONLY when \
                          information is NOT in the local codebase (external library \
                          documentation, current events, news, public APIs, general knowledge)."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reasoning": {
                        "type": "string",
                        "description": "Why this search is needed and what to expect"
                    },
                    "query": {
                        "type": "string",
                        "description": "Search query in same language as user request. Use specific terms and context. For acronyms, add context. Use quotes for exact phrases."
                    },
                    "max_results": {
                        "type": "number",
                        "description": "Maximum results (1-10, default: 5)",
                        "minimum": 1,
                        "maximum": 10
                    }
                },
                "required": ["reasoning", "query"]
            }),
        }
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities::NETWORK
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<String, ToolError> {
        let args: SearchArgs = parse_args(NAME, args)?;
        let max_results = args
            .max_results
            .map_or(DEFAULT_MAX_RESULTS, |n| n.clamp(1.0, 10.0) as u64);
        log::info!("WebSearch query: {:?}, max_results: {max_results}", args.query);
        let hits = self
            .client
            .search(
                ctx.credentials().tavily_api_key.as_deref(),
                &args.query,
                max_results,
            )
            .await?;
        Ok(format_results(&hits))
    }
}
