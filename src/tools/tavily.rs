//! Minimal Tavily API client shared by the web tools

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::ToolError;

/// Production API endpoint
pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Placeholder some installs ship with; treated like a missing key
const PLACEHOLDER_KEY: &str = "dummy-key";

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExtractedPage {
    pub url: String,
    #[serde(default)]
    pub raw_content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FailedPage {
    pub url: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExtractResponse {
    #[serde(default)]
    pub results: Vec<ExtractedPage>,
    #[serde(default)]
    pub failed_results: Vec<FailedPage>,
}

/// HTTP client for the search and extract endpoints
#[derive(Debug, Clone)]
pub struct TavilyClient {
    /// Build failure is kept and reported by each request
    http: Result<reqwest::Client, String>,
    base_url: String,
}

impl Default for TavilyClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TavilyClient {
    /// Client for the production API
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_TAVILY_BASE_URL)
    }

    /// Client for another endpoint (a proxy or a test server)
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                log::error!("Failed to build HTTP client for the web tools: {e}");
                e.to_string()
            });
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) async fn search(
        &self,
        api_key: Option<&str>,
        query: &str,
        max_results: u64,
    ) -> Result<Vec<SearchHit>, ToolError> {
        let body = json!({
            "api_key": require_key(api_key)?,
            "query": query,
            "max_results": max_results.min(10),
            "include_raw_content": false,
            "include_answer": false,
        });
        let response: SearchResponse = self.post("search", body).await?;
        log::debug!("WebSearch found {} results", response.results.len());
        Ok(response.results)
    }

    pub(crate) async fn extract(
        &self,
        api_key: Option<&str>,
        urls: &[String],
    ) -> Result<ExtractResponse, ToolError> {
        let body = json!({
            "api_key": require_key(api_key)?,
            "urls": urls,
        });
        self.post("extract", body).await
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, ToolError> {
        let http = self
            .http
            .as_ref()
            .map_err(|e| ToolError::failed(format!("HTTP client unavailable: {e}")))?;
        let response = http
            .post(format!("{}/{endpoint}", self.base_url))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

fn require_key(api_key: Option<&str>) -> Result<&str, ToolError> {
    match api_key.map(str::trim) {
        Some(key) if !key.is_empty() && key != PLACEHOLDER_KEY => Ok(key),
        _ => Err(ToolError::MissingApiKey),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_and_blank_keys_are_missing() {
        assert!(matches!(require_key(None), Err(ToolError::MissingApiKey)));
        assert!(matches!(require_key(Some("  ")), Err(ToolError::MissingApiKey)));
        assert!(matches!(require_key(Some("dummy-key")), Err(ToolError::MissingApiKey)));
        assert_eq!(require_key(Some(" tvly-1 ")).unwrap(), "tvly-1");
    }

    #[tokio::test]
    async fn http_errors_carry_status_and_body() {
        let (base, server) = test_server::serve_once(401, r#"{"detail":"bad key"}"#).await;
        let client = TavilyClient::with_base_url(base);
        let err = client.search(Some("k"), "q", 5).await.unwrap_err();
        assert_eq!(err.to_string(), r#"Tavily API error: 401 - {"detail":"bad key"}"#);
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /search"));
        assert!(request.contains(r#""api_key":"k""#));
    }

    #[tokio::test]
    async fn unbuildable_client_fails_each_request() {
        let client = TavilyClient {
            http: Err("no TLS backend".into()),
            base_url: DEFAULT_TAVILY_BASE_URL.into(),
        };
        let err = client.search(Some("k"), "q", 5).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP client unavailable: no TLS backend");
        let err = client.extract(Some("k"), &["https://a".into()]).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }
}
