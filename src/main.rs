//! # Deep Research Agent
//!
//! Command-line front-end for the `rig-deepresearch` engine.
//!
//! A question goes through four phases:
//! 1. Clarify the scope (asking you on the terminal if it is ambiguous)
//! 2. Split it into sub-topics and research them in parallel
//! 3. Repeat until the supervisor is satisfied or a limit is hit
//! 4. Write a report whose claims cite the sources they came from
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "Compare GDP growth in France and Germany since 2020"
//! ```

mod agent;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rig_deepresearch::{ProgressEvent, ResearchOutcome};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::agent::{ClarificationMode, ResearchAgent};
use crate::config::Config;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "deep-research-agent",
    version,
    about = "Researches a question in parallel sub-topics and writes a cited report",
    long_about = r#"
Deep Research Agent

Clarifies your question, splits it into sub-topics, researches them in
parallel with web search (and optionally local documents and Data Commons
statistics), then writes a report where every claim cites its sources.

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Start Ollama: ollama serve

OPTIONAL ENVIRONMENT:
  TAVILY_API_KEY      Use Tavily for web search (DuckDuckGo otherwise)
  DC_API_KEY          Enable Data Commons statistics
  RESEARCH_DOCS_DIR   Let researchers read a local document folder

EXAMPLES:
  deep-research-agent "Compare GDP growth in France and Germany"
  deep-research-agent --no-clarify --max-rounds 2 "State of Rust async runtimes"
  deep-research-agent --docs-dir ./papers --json "What do my papers say about RAG?"
"#
)]
struct Args {
    /// The research question
    #[arg(value_name = "QUERY")]
    query: String,

    /// Ollama model to use (overrides OLLAMA_MODEL)
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Maximum supervisor rounds
    #[arg(long = "max-rounds")]
    max_rounds: Option<u32>,

    /// Maximum sub-topics delegated per round
    #[arg(long = "max-subtopics")]
    max_subtopics: Option<usize>,

    /// Maximum tool calls per researcher
    #[arg(long = "max-tool-calls")]
    max_tool_calls: Option<usize>,

    /// Local document folder researchers may read
    #[arg(long = "docs-dir", value_name = "DIR")]
    docs_dir: Option<PathBuf>,

    /// Never ask clarification questions; research the request as given
    #[arg(long = "no-clarify", default_value = "false")]
    no_clarify: bool,

    /// Print the report as JSON instead of Markdown
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of the environment.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(rounds) = self.max_rounds {
            config.research = config.research.with_max_rounds(rounds);
        }
        if let Some(k) = self.max_subtopics {
            config.research = config.research.with_max_subtopics_per_round(k);
        }
        if let Some(calls) = self.max_tool_calls {
            config.research = config.research.with_max_tool_calls_per_worker(calls);
        }
        if let Some(dir) = &self.docs_dir {
            config = config.with_documents_dir(dir.clone());
        }
        config
    }
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Deep Research Agent starting up...");

    let config = args.apply(Config::from_env()?);
    config.validate()?;

    info!(
        model = %config.model,
        host = %config.ollama_host,
        max_rounds = config.research.max_rounds,
        max_subtopics = config.research.max_subtopics_per_round,
        "Configuration loaded"
    );

    let mode = if args.no_clarify {
        ClarificationMode::Skip
    } else {
        ClarificationMode::Interactive
    };
    let agent = ResearchAgent::new(&config)?.with_clarification(mode);

    let sink = |event: ProgressEvent| eprintln!("{}", describe(&event));

    let outcome = match agent.research(&args.query, &sink).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Research failed");
            eprintln!("\nResearch failed: {:#}", e);
            if e.to_string().contains("connection refused") {
                eprintln!("\nTip: Make sure Ollama is running:");
                eprintln!("   ollama serve");
            }
            return Err(e);
        }
    };

    match outcome {
        ResearchOutcome::Report(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\n{}", "=".repeat(60));
                println!("{}", report.to_markdown());
                println!("{}", "=".repeat(60));
            }
            info!(partial = report.is_partial(), "Research completed");
            Ok(())
        }
        ResearchOutcome::Failed(failure) => {
            error!(phase = %failure.phase, error = %failure.error, "Session failed");
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            } else {
                eprintln!("\nResearch failed during {}: {}", failure.phase, failure.error);
            }
            anyhow::bail!("research session failed: {}", failure.error)
        }
        ResearchOutcome::NeedsClarification(question) => {
            anyhow::bail!("session stopped waiting for clarification: {}", question)
        }
    }
}

/// One progress line for the terminal.
fn describe(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::PhaseChanged { phase } => format!("[phase] {}", phase),
        ProgressEvent::ClarificationRequested { question } => format!("[clarify] {}", question),
        ProgressEvent::SubTopicAssigned { round, subtopic } => {
            format!("[round {}] {} -> {}", round, subtopic.id, subtopic.description)
        }
        ProgressEvent::WorkerFinished {
            subtopic_id,
            partial,
            citations,
        } => format!(
            "[done] {} ({} citations{})",
            subtopic_id,
            citations,
            if *partial { ", partial" } else { "" }
        ),
        ProgressEvent::RoundCompleted { round, findings } => {
            format!("[round {}] complete, {} findings so far", round, findings)
        }
        ProgressEvent::ResearchCompleted { reason } => format!("[complete] {}", reason),
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Install the global tracing subscriber.
///
/// INFO by default, DEBUG with `--verbose`; `RUST_LOG` overrides both.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rig_deepresearch::{CompletionReason, SubTopicAssignment, SubTopicId};

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["test", "What is Rust?"]);
        assert_eq!(args.query, "What is Rust?");
        assert!(!args.no_clarify);
        assert!(!args.json);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "test",
            "--no-clarify",
            "--json",
            "--max-rounds",
            "2",
            "--max-subtopics",
            "4",
            "--max-tool-calls",
            "3",
            "--model",
            "qwen2.5",
            "Test query",
        ]);
        assert!(args.no_clarify);
        assert!(args.json);

        let config = args.apply(Config::default());
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.research.max_rounds, 2);
        assert_eq!(config.research.max_subtopics_per_round, 4);
        assert_eq!(config.research.max_tool_calls_per_worker, 3);
    }

    #[test]
    fn test_describe_events() {
        let assigned = ProgressEvent::SubTopicAssigned {
            round: 1,
            subtopic: SubTopicAssignment {
                id: SubTopicId { round: 1, index: 2 },
                description: "Germany GDP".to_string(),
                rationale: String::new(),
            },
        };
        assert_eq!(describe(&assigned), "[round 1] st-1-2 -> Germany GDP");

        let done = ProgressEvent::WorkerFinished {
            subtopic_id: SubTopicId { round: 1, index: 2 },
            partial: true,
            citations: 0,
        };
        assert_eq!(describe(&done), "[done] st-1-2 (0 citations, partial)");

        let complete = ProgressEvent::ResearchCompleted {
            reason: CompletionReason::RoundCeiling { rounds: 3 },
        };
        assert!(describe(&complete).contains("round ceiling"));
    }
}
