//! DuckDuckGo provider - keyless `web_search` fallback
//!
//! Scrapes the DuckDuckGo HTML endpoint. Used when no Tavily key is
//! configured; results carry URLs only, so snippets are best effort.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::gateway::{SourceRef, ToolDefinition, ToolOutput, ToolProvider};

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A single search hit scraped from the results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// Keyless web search over DuckDuckGo's HTML interface.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearchProvider {
    /// Maximum results to return per search
    max_results: usize,
    base_url: String,
    timeout: Duration,
}

impl DuckDuckGoSearchProvider {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results: max_results.max(1),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Perform a web search and return the scraped hits.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        info!(query = %query, "Performing DuckDuckGo search");

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;

        let url = format!("{}/html/?q={}", self.base_url, urlencoding::encode(query));
        debug!(url = %url, "Fetching search results");

        let response = client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout(self.timeout.as_millis() as u64)
            } else {
                ToolError::Unavailable(format!("DuckDuckGo: {}", e))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ToolError::RateLimited("DuckDuckGo: HTTP 429".to_string()));
        }
        if !status.is_success() {
            return Err(ToolError::Unavailable(format!("DuckDuckGo: HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Unknown(format!("DuckDuckGo: {}", e)))?;
        let hits = self.parse_html(&body);

        if hits.is_empty() {
            warn!(query = %query, "No search results found");
        }
        Ok(hits)
    }

    /// Parse DuckDuckGo HTML to extract results.
    ///
    /// Redirect links (`uddg=`) first, then the visible `result__url` hrefs.
    fn parse_html(&self, html: &str) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        let mut seen_urls = HashSet::new();

        let mut push = |url: String, hits: &mut Vec<SearchHit>| {
            if hits.len() < self.max_results
                && url.starts_with("http")
                && !url.contains("duckduckgo.com")
                && seen_urls.insert(url.clone())
            {
                hits.push(SearchHit {
                    title: extract_domain(&url).unwrap_or_else(|| "Result".to_string()),
                    url,
                });
            }
        };

        for segment in html.split("uddg=").skip(1) {
            if let Some(end) = segment.find(['&', '"', '\'']) {
                if let Ok(url) = urlencoding::decode(&segment[..end]) {
                    push(url.into_owned(), &mut hits);
                }
            }
        }

        for segment in html.split("result__url").skip(1) {
            if let Some(href_start) = segment.find("href=\"") {
                let after_href = &segment[href_start + 6..];
                if let Some(href_end) = after_href.find('"') {
                    let href = &after_href[..href_end];
                    let url = if let Some(rest) = href.strip_prefix("//") {
                        format!("https://{}", rest)
                    } else {
                        href.to_string()
                    };
                    push(url, &mut hits);
                }
            }
        }

        hits
    }
}

/// Extract the domain name from a URL.
fn extract_domain(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl ToolProvider for DuckDuckGoSearchProvider {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web using DuckDuckGo. Returns result URLs. Cite results by their URL.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to find information about"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: SearchArgs = serde_json::from_value(arguments)?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }

        let hits = self.search(&args.query).await?;
        if hits.is_empty() {
            return Ok(ToolOutput::text(format!("No results found for: {}", args.query)));
        }

        let formatted: String = hits
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}. **{}**\n   URL: {}\n", i + 1, h.title, h.url))
            .collect::<Vec<_>>()
            .join("\n");

        let sources = hits
            .into_iter()
            .map(|h| SourceRef::new(h.url, h.title))
            .collect();

        Ok(ToolOutput::text(format!("## Search Results for: {}\n\n{}", args.query, formatted))
            .with_sources(sources))
    }
}
