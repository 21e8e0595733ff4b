//! # Configuration Module
//!
//! Loads the CLI configuration from environment variables (and a `.env`
//! file), then lets command-line flags override it.
//!
//! Two kinds of settings live here:
//! - Model settings for the Ollama backend (model name, host, temperature)
//! - Research settings, handed to the library as a `ResearchConfig` and a
//!   `ResearchToolOptions`

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rig_deepresearch::{ResearchConfig, ResearchToolOptions};

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the research agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model to use (e.g., "llama3.2", "qwen2.5")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Temperature for LLM responses (0.0 = deterministic, 1.0 = creative)
    pub temperature: f64,

    /// Bounds, timeouts and policies for the research engine
    pub research: ResearchConfig,

    /// Which tool providers the workers get
    pub tools: ResearchToolOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            // Research wants focused, factual answers
            temperature: 0.3,
            research: ResearchConfig::default(),
            tools: ResearchToolOptions {
                max_search_results: 5,
                ..ResearchToolOptions::default()
            },
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are an
    /// error naming the variable.
    ///
    /// # Example
    /// ```ignore
    /// let config = Config::from_env()?;
    /// println!("Using model: {}", config.model);
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Some(val) = parse_var("TEMPERATURE")? {
            config.temperature = val;
        }

        if let Some(val) = parse_var("MAX_SEARCH_RESULTS")? {
            config.tools.max_search_results = val;
        }

        // Research bounds
        let mut research = config.research;
        if let Some(val) = parse_var("MAX_CLARIFICATION_ROUNDS")? {
            research = research.with_max_clarification_rounds(val);
        }
        if let Some(val) = parse_var("MAX_ROUNDS")? {
            research = research.with_max_rounds(val);
        }
        if let Some(val) = parse_var("MAX_SUBTOPICS")? {
            research = research.with_max_subtopics_per_round(val);
        }
        if let Some(val) = parse_var("MAX_CONCURRENT_WORKERS")? {
            research = research.with_max_concurrent_workers(val);
        }
        if let Some(val) = parse_var("MAX_TOOL_CALLS")? {
            research = research.with_max_tool_calls_per_worker(val);
        }
        if let Some(val) = parse_var("WORKER_TOKEN_BUDGET")? {
            research = research.with_worker_token_budget(val);
        }
        if let Some(val) = parse_var("SESSION_TOKEN_BUDGET")? {
            research = research.with_session_token_budget(val);
        }
        if let Some(secs) = parse_var("SESSION_TIMEOUT_SECS")? {
            research = research.with_session_timeout(Duration::from_secs(secs));
        }
        config.research = research;

        // Tool keys and the document root
        let tools = ResearchToolOptions::from_env();
        config.tools = ResearchToolOptions {
            max_search_results: config.tools.max_search_results,
            ..tools
        };

        Ok(config)
    }

    /// Point the document tools at `dir`.
    pub fn with_documents_dir(mut self, dir: PathBuf) -> Self {
        self.tools.documents_dir = Some(dir);
        self
    }

    /// Validate the configuration before the engine starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.tools.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.model.trim().is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        if let Some(dir) = &self.tools.documents_dir {
            if !dir.is_dir() {
                anyhow::bail!("Document directory does not exist: {}", dir.display());
            }
        }

        self.research
            .validate()
            .context("Invalid research configuration")?;

        Ok(())
    }
}

/// Parse an optional environment variable, naming it in the error.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a valid number, got: {:?}", name, raw)),
        Err(_) => Ok(None),
    }
}
