//! `scrape_website` tool backed by the Firecrawl scrape API.

use std::time::Duration;

use serde_json::{json, Value};

use super::base_tool::{primary_str, ToolAdapter, ToolError};
use crate::utilities::runtime::block_on;

/// Default Firecrawl endpoint.
pub const DEFAULT_FIRECRAWL_BASE_URL: &str = "https://api.firecrawl.dev";

/// Scrapes a web page and returns its content as markdown.
#[derive(Debug, Clone)]
pub struct ScrapeWebsiteTool {
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl ScrapeWebsiteTool {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Read `FIRECRAWL_API_KEY` and `FIRECRAWL_BASE_URL` from the environment.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("FIRECRAWL_API_KEY").ok().filter(|k| !k.is_empty()),
            std::env::var("FIRECRAWL_BASE_URL").unwrap_or_else(|_| DEFAULT_FIRECRAWL_BASE_URL.to_string()),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn scrape(&self, api_key: &str, url: &str) -> Result<String, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ToolError::upstream(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = format!("{}/v1/scrape", self.base_url.trim_end_matches('/'));
        let response = client
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&json!({"url": url, "formats": ["markdown"]}))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(ToolError::upstream(format!(
                "Firecrawl returned {}: {}",
                status,
                truncate(&body, 300)
            )));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| ToolError::upstream(format!("Firecrawl returned invalid JSON: {}", e)))?;
        parsed
            .pointer("/data/markdown")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ToolError::upstream("Firecrawl response has no data.markdown"))
    }
}

impl ToolAdapter for ScrapeWebsiteTool {
    fn name(&self) -> &str {
        "scrape_website"
    }

    fn description(&self) -> &str {
        "Scrapes a public web page (job postings, salary reports, company career pages) \
         and returns its main content as markdown."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Absolute http(s) URL of the page"}
            },
            "required": ["url"]
        })
    }

    fn invoke(&self, args: &Value) -> Result<String, ToolError> {
        let url = primary_str(args, "url")?.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::invalid_input(format!("'{}' is not an http(s) URL", url)));
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::invalid_input("FIRECRAWL_API_KEY is not set"))?;

        log::debug!("scrape_website: {}", url);
        block_on(self.scrape(api_key, url))
            .map_err(|e| ToolError::upstream(format!("failed to start HTTP runtime: {}", e)))?
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::timeout(e.to_string())
    } else {
        ToolError::upstream(e.to_string())
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
