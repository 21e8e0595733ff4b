//! Tavily Search provider - web search capability
//!
//! Exposes the Tavily Search API as the `web_search` capability. Results are
//! deduplicated by URL and every result becomes a citable [`SourceRef`].
//!
//! The provider performs exactly one HTTP request per invocation. Retrying
//! on rate limits is the gateway's job, so a 429 surfaces immediately as
//! [`ToolError::RateLimited`].

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ToolError;
use crate::gateway::{SourceRef, ToolDefinition, ToolOutput, ToolProvider};

/// Default timeout for Tavily API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Snippet length kept on each source
const SNIPPET_CHARS: usize = 500;

/// Search depth for Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Fast search with basic results
    #[default]
    Basic,
    /// More thorough search with detailed results
    Advanced,
}

/// Topic filter for Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// General web search
    #[default]
    General,
    /// Recent news articles
    News,
    /// Financial data and news
    Finance,
}

/// Tavily-backed `web_search` provider
///
/// # Example
/// ```ignore
/// let provider = TavilySearchProvider::new("your-api-key");
/// let gateway = ToolGateway::new().with_provider(Arc::new(provider));
/// ```
pub struct TavilySearchProvider {
    api_key: String,
    client: Client,
    timeout: Duration,
    base_url: String,
}

impl TavilySearchProvider {
    /// Create a new provider with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable TAVILY_API_KEY
    pub fn from_env() -> Option<Self> {
        std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)
    }

    /// Set custom HTTP timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point the provider at another endpoint (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Execute a single HTTP request
    async fn execute_request(&self, request: &TavilyRequest) -> Result<TavilyResponse, TavilyError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TavilyError::Timeout(self.timeout.as_millis() as u64)
                } else if e.is_connect() {
                    TavilyError::Connection(e.to_string())
                } else {
                    TavilyError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| TavilyError::ParseError(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => Err(TavilyError::Unauthorized),
            429 => Err(TavilyError::RateLimited),
            400 | 422 => Err(TavilyError::BadRequest(error_text)),
            500..=599 => Err(TavilyError::ServerError(status.as_u16(), error_text)),
            _ => Err(TavilyError::HttpError(status.as_u16(), error_text)),
        }
    }
}

/// Typed errors for Tavily API
#[derive(Debug, thiserror::Error)]
pub enum TavilyError {
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl From<TavilyError> for ToolError {
    fn from(e: TavilyError) -> Self {
        let message = format!("Tavily: {}", e);
        match e {
            TavilyError::Timeout(ms) => ToolError::Timeout(ms),
            TavilyError::RateLimited => ToolError::RateLimited(message),
            TavilyError::BadRequest(_) => ToolError::InvalidArguments(message),
            TavilyError::Unauthorized
            | TavilyError::Connection(_)
            | TavilyError::ServerError(_, _) => ToolError::Unavailable(message),
            TavilyError::Network(_) | TavilyError::HttpError(_, _) | TavilyError::ParseError(_) => {
                ToolError::Unknown(message)
            }
        }
    }
}

/// Arguments for the web_search capability
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    /// The search query
    query: String,

    /// Maximum number of results (default: 5)
    #[serde(default = "default_max_results")]
    max_results: u32,

    #[serde(default)]
    search_depth: SearchDepth,

    #[serde(default)]
    topic: Topic,
}

fn default_max_results() -> u32 {
    5
}

/// Request body for Tavily API
#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    max_results: u32,
    search_depth: SearchDepth,
    topic: Topic,
    include_answer: bool,
    include_raw_content: bool,
}

/// Response from Tavily API
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

/// Individual search result
#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

impl TavilyResult {
    /// Format as markdown for LLM consumption
    fn to_markdown(&self) -> String {
        format!(
            "### [{}]({})\n**Relevance:** {:.0}%\n\n{}\n",
            self.title,
            self.url,
            self.score * 100.0,
            self.content
        )
    }

    fn to_source(&self) -> SourceRef {
        SourceRef::new(&self.url, &self.title).with_snippet(truncate(&self.content, SNIPPET_CHARS))
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[async_trait]
impl ToolProvider for TavilySearchProvider {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web. Returns relevant pages with titles, URLs and content snippets. Cite results by their URL.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to execute",
                        "maxLength": 400
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return (default: 5, max: 20)",
                        "default": 5,
                        "minimum": 1,
                        "maximum": 20
                    },
                    "search_depth": {
                        "type": "string",
                        "enum": ["basic", "advanced"],
                        "default": "basic"
                    },
                    "topic": {
                        "type": "string",
                        "enum": ["general", "news", "finance"],
                        "default": "general"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: SearchArgs = serde_json::from_value(arguments)?;

        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        if args.query.len() > 400 {
            return Err(ToolError::InvalidArguments(
                "query too long (max 400 characters)".to_string(),
            ));
        }

        let request = TavilyRequest {
            query: args.query.clone(),
            max_results: args.max_results.clamp(1, 20),
            search_depth: args.search_depth,
            topic: args.topic,
            include_answer: false,
            include_raw_content: false,
        };

        debug!(query = %request.query, max_results = request.max_results, "Executing Tavily search");
        let response = self.execute_request(&request).await?;

        let mut seen = HashSet::new();
        let results: Vec<&TavilyResult> = response
            .results
            .iter()
            .filter(|r| seen.insert(r.url.clone()))
            .collect();

        let mut output = format!("## Search Results for: \"{}\"\n\n", args.query);
        if results.is_empty() {
            output.push_str("No results found.\n");
        } else {
            output.push_str(&format!("Found {} results:\n\n", results.len()));
            for result in &results {
                output.push_str(&result.to_markdown());
                output.push('\n');
            }
        }

        let sources = results.iter().map(|r| r.to_source()).collect();
        Ok(ToolOutput::text(output).with_sources(sources))
    }
}
