//! # Agent Module
//!
//! Wires the research engine to a local Ollama model and the configured
//! tool providers, and drives one session from question to report.
//!
//! The engine does the real work (clarify, delegate, research in parallel,
//! synthesize). This module only decides where clarification answers come
//! from and which backend makes the decisions.

use std::sync::Arc;

use anyhow::{Context, Result};
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::ollama;
use rig_deepresearch::{
    research_tools, LLMProvider, ProgressSink, ResearchEngine, ResearchOutcome, RigAgentAdapter,
    ToolGateway,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::config::Config;

// =============================================================================
// SYSTEM PROMPT
// =============================================================================
/// Preamble for the Ollama agent. The per-call instructions come from the
/// engine's own prompts; this only pins down the answer format.
const RESEARCH_SYSTEM_PROMPT: &str = r#"
You are one step of a research pipeline. Each request tells you which tools
you may call and what to do.

When you call a tool, answer with a single JSON object and nothing else:
{"tool_calls": [{"name": "<tool name>", "arguments": { ... }}]}

When you do not need a tool, answer in plain text.
Never invent sources. Only cite what a tool returned.
"#;

// =============================================================================
// CLARIFICATION SOURCE
// =============================================================================
/// Where answers to clarification questions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationMode {
    /// Ask on stderr, read the answer from stdin
    Interactive,
    /// Answer every question with an empty answer; the clarification cap
    /// then turns the request into a best-effort brief
    Skip,
}

impl ClarificationMode {
    async fn answer(&self, question: &str) -> Result<String> {
        match self {
            ClarificationMode::Skip => Ok(String::new()),
            ClarificationMode::Interactive => {
                let mut stderr = tokio::io::stderr();
                stderr
                    .write_all(format!("\n? {}\n> ", question).as_bytes())
                    .await?;
                stderr.flush().await?;

                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                // EOF counts as "no further detail"
                let answer = lines
                    .next_line()
                    .await
                    .context("Failed to read clarification answer")?
                    .unwrap_or_default();
                Ok(answer)
            }
        }
    }
}

// =============================================================================
// RESEARCH AGENT STRUCT
// =============================================================================
/// Owns a research engine and runs sessions to completion.
pub struct ResearchAgent {
    engine: ResearchEngine,
    clarification: ClarificationMode,
}

impl ResearchAgent {
    /// Build an agent backed by the configured Ollama model and tools.
    pub fn new(config: &Config) -> Result<Self> {
        // ollama::Client::from_env() reads OLLAMA_API_BASE_URL
        std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
        let client = ollama::Client::from_env();

        let agent = client
            .agent(&config.model)
            .preamble(RESEARCH_SYSTEM_PROMPT)
            .temperature(config.temperature)
            .build();
        debug!(host = %config.ollama_host, model = %config.model, "Connected to Ollama");

        let llm: Arc<dyn LLMProvider> =
            Arc::new(RigAgentAdapter::with_names(agent, "ollama", config.model.clone()));

        let gateway = research_tools(&config.tools)
            .context("Failed to set up research tools")?
            .into_iter()
            .fold(ToolGateway::new(), |gateway, provider| gateway.with_provider(provider));

        Self::with_backend(config, llm, gateway)
    }

    /// Build an agent around any decision backend and gateway.
    pub fn with_backend(config: &Config, llm: Arc<dyn LLMProvider>, gateway: ToolGateway) -> Result<Self> {
        let engine = ResearchEngine::new(llm, gateway, config.research.clone())
            .context("Failed to create research engine")?;
        Ok(Self {
            engine,
            clarification: ClarificationMode::Interactive,
        })
    }

    pub fn with_clarification(mut self, mode: ClarificationMode) -> Self {
        self.clarification = mode;
        self
    }

    /// Research `query` until the engine delivers a report or a failure.
    ///
    /// Clarification questions are answered from the configured source and
    /// the session resumes. Never returns `ResearchOutcome::NeedsClarification`.
    pub async fn research(&self, query: &str, sink: &dyn ProgressSink) -> Result<ResearchOutcome> {
        info!(query = %query, "Starting research task");

        let handle = self
            .engine
            .start_session(query, vec![])
            .await
            .context("Failed to start research session")?;

        loop {
            match self.engine.run_to_completion(&handle, sink).await? {
                ResearchOutcome::NeedsClarification(question) => {
                    let answer = self.clarification.answer(&question).await?;
                    debug!(session_id = %handle.id(), answered = !answer.is_empty(), "Clarification answered");
                    self.engine.submit_clarification(&handle, &answer).await?;
                }
                outcome => return Ok(outcome),
            }
        }
    }
}
