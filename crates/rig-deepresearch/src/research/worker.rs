//! Research worker
//!
//! Runs the tool-use loop for one sub-topic with its own context, then
//! compresses what it found into a [`Finding`]. Iterations are strictly
//! sequential. Every suspension point races the session's cancellation
//! token and the worker's deadline, so a forced stop still yields a finding
//! built from the evidence gathered so far.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts::ResearchPrompts;
use super::state::{Citation, Finding, FindingStatus, IncompleteCause, SubTopicAssignment};
use crate::cost::CostLedger;
use crate::error::ToolErrorKind;
use crate::gateway::{SourceRef, ToolGateway};
use crate::llm::{decide, Decided, Decision, LLMConfig, LLMProvider};
use crate::state::Message;

/// Sources quoted in an extractive summary
const MAX_EXTRACTIVE_SOURCES: usize = 5;

/// Capabilities billed as metered searches
const METERED_TOOLS: &[&str] = &["web_search"];

/// One citation as returned by the compression step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CitedSource {
    pub source_id: String,
    #[serde(default)]
    pub locator: Option<String>,
}

/// The compression step's structured output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompressedResearch {
    pub summary: String,
    #[serde(default)]
    pub citations: Vec<CitedSource>,
}

impl Decision for CompressedResearch {
    const NAME: &'static str = "submit_findings";

    fn description() -> &'static str {
        "Submit the cited summary of the research gathered so far."
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Facts found, each traceable to a cited source"
                },
                "citations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "source_id": {"type": "string"},
                            "locator": {"type": "string"}
                        },
                        "required": ["source_id"]
                    }
                }
            },
            "required": ["summary", "citations"]
        })
    }
}

/// Tokens the workers of one round may spend together.
///
/// Clones share one counter. Workers charge every backend call as it
/// happens and stop once the round's allowance is gone.
#[derive(Debug, Clone)]
pub struct RoundBudget {
    limit: u64,
    spent: Arc<AtomicU64>,
}

impl RoundBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            spent: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn charge(&self, tokens: u64) {
        self.spent.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn spent(&self) -> u64 {
        self.spent.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent() >= self.limit
    }
}

/// What a worker hands back to the supervisor.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub finding: Finding,
    /// Usage recorded by this worker only
    pub ledger: CostLedger,
    pub tool_calls: usize,
}

/// Executes one sub-topic assignment.
#[derive(Clone)]
pub struct ResearchWorker {
    llm: Arc<dyn LLMProvider>,
    gateway: ToolGateway,
    llm_config: Option<LLMConfig>,
    max_tool_calls: usize,
    token_budget: Option<u64>,
    round_budget: Option<RoundBudget>,
}

impl ResearchWorker {
    pub fn new(llm: Arc<dyn LLMProvider>, gateway: ToolGateway, max_tool_calls: usize) -> Self {
        Self {
            llm,
            gateway,
            llm_config: None,
            max_tool_calls,
            token_budget: None,
            round_budget: None,
        }
    }

    pub fn with_llm_config(mut self, config: Option<LLMConfig>) -> Self {
        self.llm_config = config;
        self
    }

    pub fn with_token_budget(mut self, budget: Option<u64>) -> Self {
        self.token_budget = budget;
        self
    }

    pub fn with_round_budget(mut self, budget: Option<RoundBudget>) -> Self {
        self.round_budget = budget;
        self
    }

    fn model(&self) -> String {
        self.llm.model_for(self.llm_config.as_ref())
    }

    /// Race `fut` against cancellation and the deadline.
    async fn guarded<F: Future>(
        fut: F,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<F::Output, IncompleteCause> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IncompleteCause::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(IncompleteCause::Timeout),
            out = fut => Ok(out),
        }
    }

    /// Research one sub-topic. Never fails: problems become a partial finding.
    pub async fn run(
        &self,
        assignment: SubTopicAssignment,
        cancel: CancellationToken,
        deadline: Instant,
        mut ledger: CostLedger,
    ) -> WorkerOutcome {
        let subtopic_id = assignment.id.to_string();
        let model = self.model();
        let tools = self.gateway.definitions();
        info!(subtopic_id = %subtopic_id, tools = tools.len(), "Worker started");

        let mut messages = vec![
            Message::system(&ResearchPrompts::researcher(&assignment, self.max_tool_calls)),
            Message::user(&assignment.description),
        ];
        let mut evidence: Vec<SourceRef> = Vec::new();
        let mut seen_sources: HashSet<String> = HashSet::new();
        let mut tool_calls = 0usize;
        let mut last_tool_error: Option<ToolErrorKind> = None;
        let mut stop: Option<IncompleteCause> = None;

        'research: loop {
            if tool_calls >= self.max_tool_calls {
                info!(subtopic_id = %subtopic_id, tool_calls, "Tool-call bound reached, forcing stop");
                stop = Some(IncompleteCause::WorkerBudgetExceeded {
                    max_tool_calls: self.max_tool_calls,
                });
                break;
            }
            if let Some(limit) = self.over_token_budget(&ledger) {
                info!(subtopic_id = %subtopic_id, limit, "Worker token budget reached, forcing stop");
                stop = Some(IncompleteCause::TokenBudgetExceeded { limit });
                break;
            }

            let completion = Self::guarded(
                self.llm.complete(&messages, &tools, self.llm_config.as_ref()),
                &cancel,
                deadline,
            )
            .await;
            let response = match completion {
                Ok(Ok(response)) => response,
                Ok(Err(error)) => {
                    warn!(subtopic_id = %subtopic_id, error = %error, "Backend call failed");
                    stop = Some(IncompleteCause::BackendFailure {
                        message: error.to_string(),
                    });
                    break;
                }
                Err(cause) => {
                    stop = Some(cause);
                    break;
                }
            };

            let usage = response.usage_or_estimate(&messages);
            ledger.record_llm("research", &model, &usage);
            self.charge_round(usage.total_tokens);

            let calls = response.message.tool_calls().to_vec();
            messages.push(response.message);
            if calls.is_empty() {
                debug!(subtopic_id = %subtopic_id, tool_calls, "Worker judged research sufficient");
                break;
            }

            for call in calls {
                if tool_calls >= self.max_tool_calls {
                    continue 'research;
                }
                tool_calls += 1;

                let result = match Self::guarded(self.gateway.invoke_call(&call), &cancel, deadline).await {
                    Ok(result) => result,
                    Err(cause) => {
                        stop = Some(cause);
                        break 'research;
                    }
                };

                match &result.error {
                    None => {
                        if METERED_TOOLS.contains(&result.tool_name.as_str()) {
                            ledger.record_search(&result.tool_name);
                        }
                        for source in &result.sources {
                            if seen_sources.insert(source.source_id.clone()) {
                                evidence.push(source.clone());
                            }
                        }
                    }
                    Some(error) => last_tool_error = Some(error.kind()),
                }
                messages.push(Message::tool(&result.render_for_context(), &call.id));
            }
        }

        if let Some(cause) = &stop {
            info!(subtopic_id = %subtopic_id, cause = %cause, "Worker stopped early");
        }

        let finding = if evidence.is_empty() {
            self.without_evidence(&assignment, stop, last_tool_error)
        } else {
            self.compress(&assignment, &messages, &evidence, stop, &cancel, deadline, &mut ledger)
                .await
        };

        info!(
            subtopic_id = %subtopic_id,
            tool_calls,
            citations = finding.citations.len(),
            partial = finding.is_partial(),
            "Worker finished"
        );

        WorkerOutcome {
            finding,
            ledger,
            tool_calls,
        }
    }

    /// Limit that stops this worker: its own cap first, then the round's.
    fn over_token_budget(&self, ledger: &CostLedger) -> Option<u64> {
        self.token_budget
            .filter(|limit| ledger.total_tokens() >= *limit)
            .or_else(|| {
                self.round_budget
                    .as_ref()
                    .filter(|round| round.is_exhausted())
                    .map(RoundBudget::limit)
            })
    }

    fn charge_round(&self, tokens: u64) {
        if let Some(round) = &self.round_budget {
            round.charge(tokens);
        }
    }

    /// Finding for a worker that gathered no citable evidence.
    fn without_evidence(
        &self,
        assignment: &SubTopicAssignment,
        stop: Option<IncompleteCause>,
        last_tool_error: Option<ToolErrorKind>,
    ) -> Finding {
        // Tool failures explain an empty result better than the bound they ran into.
        if let Some(kind) = last_tool_error {
            return Finding::failed(assignment, IncompleteCause::ToolFailure { kind });
        }
        match stop {
            Some(cause) => Finding::failed(assignment, cause),
            None => Finding {
                subtopic_id: assignment.id,
                topic: assignment.description.clone(),
                summary: "No sourced evidence was found for this sub-topic.".to_string(),
                citations: Vec::new(),
                status: FindingStatus::Complete,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn compress(
        &self,
        assignment: &SubTopicAssignment,
        transcript: &[Message],
        evidence: &[SourceRef],
        mut stop: Option<IncompleteCause>,
        cancel: &CancellationToken,
        deadline: Instant,
        ledger: &mut CostLedger,
    ) -> Finding {
        if stop.is_none() {
            if let Some(limit) = self.over_token_budget(ledger) {
                info!(subtopic_id = %assignment.id, limit, "Token budget gone before compression");
                stop = Some(IncompleteCause::TokenBudgetExceeded { limit });
            }
        }
        let backend_allowed = !matches!(
            stop,
            Some(IncompleteCause::Cancelled)
                | Some(IncompleteCause::Timeout)
                | Some(IncompleteCause::TokenBudgetExceeded { .. })
        );

        let mut compressed = None;
        if backend_allowed {
            let mut messages = vec![Message::system(&ResearchPrompts::compressor(
                CompressedResearch::NAME,
                &assignment.description,
            ))];
            messages.extend(transcript.iter().skip(1).cloned());
            messages.push(Message::user("Submit your findings now."));

            match Self::guarded(
                decide::<CompressedResearch>(self.llm.as_ref(), &messages, self.llm_config.as_ref()),
                cancel,
                deadline,
            )
            .await
            {
                Ok(Ok(Decided { decision, usage })) => {
                    ledger.record_llm("compress", &self.model(), &usage);
                    self.charge_round(usage.total_tokens);
                    compressed = Some(decision);
                }
                Ok(Err(error)) => {
                    warn!(subtopic_id = %assignment.id, error = %error, "Compression failed, using extractive summary");
                }
                Err(cause) => stop = Some(cause),
            }
        }

        let grounded = compressed.and_then(|c| {
            let citations = ground_citations(&c.citations, evidence);
            if citations.is_empty() || c.summary.trim().is_empty() {
                warn!(subtopic_id = %assignment.id, "Compressed summary cites no observed source");
                None
            } else {
                Some((c.summary.trim().to_string(), citations))
            }
        });
        let (summary, citations) = grounded.unwrap_or_else(|| extractive_summary(evidence));

        Finding {
            subtopic_id: assignment.id,
            topic: assignment.description.clone(),
            summary,
            citations,
            status: match stop {
                Some(cause) => FindingStatus::Partial { cause },
                None => FindingStatus::Complete,
            },
        }
    }
}

/// Keep only citations naming a source the worker actually observed.
fn ground_citations(cited: &[CitedSource], evidence: &[SourceRef]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    cited
        .iter()
        .filter_map(|c| {
            let source = evidence.iter().find(|s| s.source_id == c.source_id.trim())?;
            if !seen.insert(source.source_id.clone()) {
                return None;
            }
            let mut citation = Citation::from_source(source);
            if let Some(locator) = c.locator.as_ref().filter(|l| !l.trim().is_empty()) {
                citation.locator = Some(locator.clone());
            }
            Some(citation)
        })
        .collect()
}

/// Summary quoted directly from source snippets.
fn extractive_summary(evidence: &[SourceRef]) -> (String, Vec<Citation>) {
    let used: Vec<&SourceRef> = evidence.iter().take(MAX_EXTRACTIVE_SOURCES).collect();
    let lines: Vec<String> = used
        .iter()
        .map(|s| match Some(s.snippet.trim()).filter(|t| !t.is_empty()) {
            Some(snippet) => format!("{} ({})", snippet, s.title),
            None => format!("Relevant source: {}", s.title),
        })
        .collect();
    let citations = used.into_iter().map(Citation::from_source).collect();
    (lines.join("\n"), citations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LLMError, ToolError};
    use crate::gateway::{DynToolProvider, ToolDefinition, ToolOutput, ToolProvider};
    use crate::llm::LLMResponse;
    use crate::research::state::SubTopicId;
    use crate::state::ToolCall;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted assistant messages; repeats the last one when exhausted.
    struct ScriptedLLM {
        replies: Mutex<Vec<Message>>,
        last: Message,
    }

    impl ScriptedLLM {
        fn new(replies: Vec<Message>) -> Arc<Self> {
            let last = replies.last().cloned().unwrap_or_else(|| Message::assistant("done"));
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                last,
            })
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedLLM {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, LLMError> {
            let reply = self.replies.lock().unwrap().pop().unwrap_or_else(|| self.last.clone());
            Ok(LLMResponse::new(reply))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }
    }

    struct FixedSearch {
        result: Result<ToolOutput, ToolError>,
        delay: Duration,
    }

    #[async_trait]
    impl ToolProvider for FixedSearch {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "web_search".into(),
                description: "search".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, _arguments: Value) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn insee() -> ToolOutput {
        ToolOutput::text("France GDP grew 1.1% in 2024").with_sources(vec![SourceRef::new(
            "https://insee.fr/gdp",
            "INSEE",
        )
        .with_snippet("GDP grew 1.1% in 2024")])
    }

    fn gateway(result: Result<ToolOutput, ToolError>, delay: Duration) -> ToolGateway {
        let provider: DynToolProvider = Arc::new(FixedSearch { result, delay });
        ToolGateway::new()
            .with_rate_limit_backoff(Duration::from_millis(1))
            .with_provider(provider)
    }

    fn search_call(id: &str) -> Message {
        Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new(id, "web_search", json!({"query": "France GDP"}))],
        )
    }

    fn submit(summary: &str, source_id: &str) -> Message {
        Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new(
                "s",
                CompressedResearch::NAME,
                json!({"summary": summary, "citations": [{"source_id": source_id}]}),
            )],
        )
    }

    fn assignment() -> SubTopicAssignment {
        SubTopicAssignment {
            id: SubTopicId::new(1, 1),
            description: "France GDP growth".into(),
            rationale: "first country".into(),
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_grounded_finding() {
        let llm = ScriptedLLM::new(vec![
            search_call("c1"),
            Message::assistant("enough"),
            submit("France grew 1.1% in 2024.", "https://insee.fr/gdp"),
        ]);
        let worker = ResearchWorker::new(llm, gateway(Ok(insee()), Duration::ZERO), 5);

        let outcome = worker
            .run(assignment(), CancellationToken::new(), far_deadline(), CostLedger::default())
            .await;

        assert_eq!(outcome.finding.status, FindingStatus::Complete);
        assert_eq!(outcome.finding.summary, "France grew 1.1% in 2024.");
        assert_eq!(outcome.finding.citations.len(), 1);
        assert_eq!(outcome.finding.citations[0].title, "INSEE");
        assert_eq!(outcome.tool_calls, 1);
        let summary = outcome.ledger.summary();
        assert_eq!(summary.llm_calls, 3);
        assert_eq!(summary.searches, 1);
    }

    #[tokio::test]
    async fn test_fabricated_citation_falls_back_to_extractive() {
        let llm = ScriptedLLM::new(vec![
            search_call("c1"),
            Message::assistant("enough"),
            submit("Made-up claim.", "https://nowhere.example"),
        ]);
        let worker = ResearchWorker::new(llm, gateway(Ok(insee()), Duration::ZERO), 5);

        let outcome = worker
            .run(assignment(), CancellationToken::new(), far_deadline(), CostLedger::default())
            .await;

        assert!(!outcome.finding.summary.contains("Made-up"));
        assert!(outcome.finding.summary.contains("GDP grew 1.1% in 2024"));
        assert_eq!(outcome.finding.citations[0].source_id, "https://insee.fr/gdp");
    }

    #[tokio::test]
    async fn test_tool_call_bound_forces_partial() {
        let llm = ScriptedLLM::new(vec![search_call("c1")]);
        let worker = ResearchWorker::new(llm, gateway(Ok(insee()), Duration::ZERO), 2);

        let outcome = worker
            .run(assignment(), CancellationToken::new(), far_deadline(), CostLedger::default())
            .await;

        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(
            outcome.finding.incomplete_cause(),
            Some(&IncompleteCause::WorkerBudgetExceeded { max_tool_calls: 2 })
        );
        assert!(!outcome.finding.citations.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_tools_yield_partial_with_cause() {
        let llm = ScriptedLLM::new(vec![search_call("c1")]);
        let worker = ResearchWorker::new(
            llm,
            gateway(Err(ToolError::RateLimited("429".into())), Duration::ZERO),
            3,
        );

        let outcome = worker
            .run(assignment(), CancellationToken::new(), far_deadline(), CostLedger::default())
            .await;

        assert_eq!(
            outcome.finding.incomplete_cause(),
            Some(&IncompleteCause::ToolFailure {
                kind: ToolErrorKind::RateLimited
            })
        );
        assert!(outcome.finding.summary.contains("RateLimited"));
        assert!(outcome.finding.citations.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_keeps_gathered_evidence() {
        let llm = ScriptedLLM::new(vec![search_call("c1"), search_call("c2")]);
        let provider: DynToolProvider = Arc::new(FixedSearch {
            result: Ok(insee()),
            delay: Duration::from_millis(50),
        });
        let gateway = ToolGateway::new().with_provider(provider);
        let worker = ResearchWorker::new(llm, gateway, 5);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            trigger.cancel();
        });

        let outcome = worker
            .run(assignment(), cancel, far_deadline(), CostLedger::default())
            .await;

        assert_eq!(outcome.finding.incomplete_cause(), Some(&IncompleteCause::Cancelled));
        assert_eq!(outcome.finding.citations.len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_marks_timeout() {
        let llm = ScriptedLLM::new(vec![search_call("c1")]);
        let worker = ResearchWorker::new(llm, gateway(Ok(insee()), Duration::from_secs(5)), 5);

        let outcome = worker
            .run(
                assignment(),
                CancellationToken::new(),
                Instant::now() + Duration::from_millis(30),
                CostLedger::default(),
            )
            .await;

        assert_eq!(outcome.finding.incomplete_cause(), Some(&IncompleteCause::Timeout));
    }

    #[tokio::test]
    async fn test_worker_token_budget() {
        let llm = ScriptedLLM::new(vec![search_call("c1")]);
        let worker = ResearchWorker::new(llm, gateway(Ok(insee()), Duration::ZERO), 10)
            .with_token_budget(Some(1));

        let outcome = worker
            .run(assignment(), CancellationToken::new(), far_deadline(), CostLedger::default())
            .await;

        assert_eq!(
            outcome.finding.incomplete_cause(),
            Some(&IncompleteCause::TokenBudgetExceeded { limit: 1 })
        );
        assert_eq!(outcome.tool_calls, 1);
    }

    #[test]
    fn test_ground_citations_dedups_and_filters() {
        let evidence = vec![SourceRef::new("a", "A").with_locator("p. 1"), SourceRef::new("b", "B")];
        let cited = vec![
            CitedSource { source_id: "a".into(), locator: None },
            CitedSource { source_id: "x".into(), locator: None },
            CitedSource { source_id: "a".into(), locator: Some("p. 2".into()) },
            CitedSource { source_id: "b".into(), locator: Some("line 3".into()) },
        ];

        let citations = ground_citations(&cited, &evidence);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].locator.as_deref(), Some("p. 1"));
        assert_eq!(citations[1].locator.as_deref(), Some("line 3"));
    }

    #[tokio::test]
    async fn test_exhausted_round_budget_skips_compression() {
        let llm = ScriptedLLM::new(vec![
            search_call("c1"),
            Message::assistant("enough"),
            submit("France grew 1.1% in 2024.", "https://insee.fr/gdp"),
        ]);
        let round = RoundBudget::new(1);
        let worker = ResearchWorker::new(llm, gateway(Ok(insee()), Duration::ZERO), 5)
            .with_round_budget(Some(round.clone()));

        let outcome = worker
            .run(assignment(), CancellationToken::new(), far_deadline(), CostLedger::default())
            .await;

        assert_eq!(
            outcome.finding.incomplete_cause(),
            Some(&IncompleteCause::TokenBudgetExceeded { limit: 1 })
        );
        assert_eq!(outcome.ledger.summary().llm_calls, 1);
        assert_eq!(round.spent(), outcome.ledger.total_tokens());
        assert!(outcome.finding.summary.contains("GDP grew 1.1% in 2024"));
    }

    #[test]
    fn test_round_budget_clones_share_spending() {
        let round = RoundBudget::new(100);
        let other = round.clone();
        round.charge(60);
        assert!(!other.is_exhausted());
        other.charge(40);
        assert!(round.is_exhausted());
        assert_eq!(round.spent(), 100);
    }

    #[test]
    fn test_extractive_summary_quotes_snippets() {
        let evidence = vec![
            SourceRef::new("https://insee.fr/gdp", "INSEE").with_snippet("  GDP grew 1.1% in 2024 "),
            SourceRef::new("https://destatis.de", "Destatis").with_snippet("   "),
            SourceRef::new("doc:notes.md", "notes.md"),
        ];

        let (summary, citations) = extractive_summary(&evidence);

        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(
            lines,
            vec![
                "GDP grew 1.1% in 2024 (INSEE)",
                "Relevant source: Destatis",
                "Relevant source: notes.md",
            ]
        );
        assert_eq!(citations.len(), 3);
        assert_eq!(citations[2].source_id, "doc:notes.md");
    }

    #[test]
    fn test_extractive_summary_caps_sources() {
        let evidence: Vec<SourceRef> = (0..8)
            .map(|i| SourceRef::new(format!("src:{}", i), format!("S{}", i)).with_snippet("fact"))
            .collect();

        let (summary, citations) = extractive_summary(&evidence);
        assert_eq!(citations.len(), MAX_EXTRACTIVE_SOURCES);
        assert_eq!(summary.lines().count(), MAX_EXTRACTIVE_SOURCES);
    }
}
