//! Tool provider adapters
//!
//! Each adapter implements [`ToolProvider`](crate::gateway::ToolProvider) for
//! one external service and normalizes its failures into `ToolError`.
//!
//! | Capability | Provider |
//! |------------|----------|
//! | `web_search` | [`TavilySearchProvider`] or [`DuckDuckGoSearchProvider`] |
//! | `list_documents` / `read_document` / `search_documents` | [`LocalDocumentStore`] |
//! | `statistical_data` | [`DataCommonsProvider`] |
//! | `think` | [`ThinkTool`] |

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

mod datacommons;
mod documents;
mod duckduckgo;
mod tavily;
mod think;

pub use datacommons::DataCommonsProvider;
pub use documents::{normalize_relative, LocalDocumentStore};
pub use duckduckgo::{DuckDuckGoSearchProvider, SearchHit};
pub use tavily::{SearchDepth, TavilyError, TavilySearchProvider, Topic};
pub use think::ThinkTool;

use crate::error::ToolError;
use crate::gateway::DynToolProvider;

/// Which providers to wire into a research gateway.
#[derive(Debug, Clone, Default)]
pub struct ResearchToolOptions {
    /// Tavily key; without one web search falls back to DuckDuckGo
    pub tavily_api_key: Option<String>,
    /// Data Commons key; without one `statistical_data` is not offered
    pub datacommons_api_key: Option<String>,
    /// Root of the local document store, if any
    pub documents_dir: Option<PathBuf>,
    /// Results per DuckDuckGo search
    pub max_search_results: usize,
}

impl ResearchToolOptions {
    /// Options from TAVILY_API_KEY, DC_API_KEY and RESEARCH_DOCS_DIR.
    pub fn from_env() -> Self {
        let non_blank = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            tavily_api_key: non_blank("TAVILY_API_KEY"),
            datacommons_api_key: non_blank("DC_API_KEY"),
            documents_dir: non_blank("RESEARCH_DOCS_DIR").map(PathBuf::from),
            max_search_results: 5,
        }
    }
}

/// Providers for a research gateway: web search, optional documents and
/// statistics, and the think tool.
///
/// # Example
/// ```ignore
/// let providers = research_tools(&ResearchToolOptions::from_env())?;
/// let gateway = providers.into_iter().fold(ToolGateway::new(), |g, p| g.with_provider(p));
/// ```
pub fn research_tools(options: &ResearchToolOptions) -> Result<Vec<DynToolProvider>, ToolError> {
    let mut providers: Vec<DynToolProvider> = Vec::new();

    match &options.tavily_api_key {
        Some(key) => providers.push(Arc::new(TavilySearchProvider::new(key.clone()))),
        None => {
            info!("TAVILY_API_KEY not set, using DuckDuckGo for web_search");
            providers.push(Arc::new(DuckDuckGoSearchProvider::new(
                options.max_search_results.max(1),
            )));
        }
    }

    if let Some(dir) = &options.documents_dir {
        providers.extend(LocalDocumentStore::new(dir.clone())?.providers());
    }

    if let Some(key) = &options.datacommons_api_key {
        providers.push(Arc::new(DataCommonsProvider::new(key.clone())));
    }

    providers.push(Arc::new(ThinkTool));
    Ok(providers)
}
