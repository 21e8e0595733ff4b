//! Supervisor
//!
//! Drives research rounds as an explicit state machine:
//!
//! ```text
//! PLANNING ──delegate──▶ DISPATCHING ──join──▶ AGGREGATING ──▶ PLANNING
//!     │
//!     └──complete / ceiling / budget / deadline──▶ COMPLETE
//! ```
//!
//! Workers of one round run concurrently in a `JoinSet`, at most
//! `effective_concurrency()` at a time. AGGREGATING is a join barrier: it
//! starts only once every worker of the round has produced a finding.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts::ResearchPrompts;
use super::state::{
    CompletionReason, Finding, IncompleteCause, ResearchBrief, SessionPhase, SessionState,
    SubTopicAssignment, SubTopicId,
};
use super::worker::{ResearchWorker, RoundBudget, WorkerOutcome};
use crate::config::{CompletionTieBreak, ResearchConfig};
use crate::error::ResearchError;
use crate::gateway::ToolGateway;
use crate::llm::{decide, Decided, Decision, LLMConfig, LLMProvider};
use crate::session::{ProgressEvent, ProgressSink};
use crate::state::Message;

/// A sub-topic as proposed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlannedSubTopic {
    pub description: String,
    #[serde(default)]
    pub rationale: String,
}

/// The supervisor's structured planning decision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SupervisorDecision {
    Delegate { subtopics: Vec<PlannedSubTopic> },
    ResearchComplete { reason: String },
}

impl Decision for SupervisorDecision {
    const NAME: &'static str = "plan_research";

    fn description() -> &'static str {
        "Delegate a batch of sub-topics to researchers, or declare the research complete."
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "decision": {
                    "type": "string",
                    "enum": ["delegate", "research_complete"]
                },
                "subtopics": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": {"type": "string"},
                            "rationale": {"type": "string"}
                        },
                        "required": ["description"]
                    },
                    "description": "Self-contained sub-topics (delegate only)"
                },
                "reason": {
                    "type": "string",
                    "description": "Why the success criteria are met (research_complete only)"
                }
            },
            "required": ["decision"]
        })
    }
}

/// Supervisor control states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    Planning,
    Dispatching,
    Aggregating,
    Complete,
}

enum Step {
    Planning,
    Dispatching(Vec<SubTopicAssignment>),
    Aggregating(Vec<WorkerOutcome>),
    Complete(CompletionReason),
}

impl Step {
    fn phase(&self) -> SupervisorPhase {
        match self {
            Step::Planning => SupervisorPhase::Planning,
            Step::Dispatching(_) => SupervisorPhase::Dispatching,
            Step::Aggregating(_) => SupervisorPhase::Aggregating,
            Step::Complete(_) => SupervisorPhase::Complete,
        }
    }
}

pub struct Supervisor {
    llm: Arc<dyn LLMProvider>,
    llm_config: Option<LLMConfig>,
    worker: ResearchWorker,
    config: ResearchConfig,
}

impl Supervisor {
    pub fn new(llm: Arc<dyn LLMProvider>, gateway: ToolGateway, config: &ResearchConfig) -> Self {
        let llm_config = LLMConfig::for_model(config.model.as_deref());
        let worker = ResearchWorker::new(llm.clone(), gateway, config.max_tool_calls_per_worker)
            .with_llm_config(llm_config.clone());
        Self {
            llm,
            llm_config,
            worker,
            config: config.clone(),
        }
    }

    fn model(&self) -> String {
        self.llm.model_for(self.llm_config.as_ref())
    }

    /// Run rounds until research completes.
    ///
    /// The session must be RESEARCHING with a brief. Findings are appended to
    /// `state` at each AGGREGATING step. Cancelling `cancel` stops in-flight
    /// workers, which still report partial findings.
    pub async fn run(
        &self,
        state: &mut SessionState,
        cancel: &CancellationToken,
        deadline: Instant,
        sink: &dyn ProgressSink,
    ) -> Result<CompletionReason, ResearchError> {
        let brief = match (&state.phase, &state.brief) {
            (SessionPhase::Researching, Some(brief)) => brief.clone(),
            _ => {
                return Err(ResearchError::InvalidPhaseTransition {
                    from: state.phase.to_string(),
                    operation: "run research rounds",
                })
            }
        };

        let mut step = Step::Planning;
        loop {
            debug!(phase = ?step.phase(), round = state.round_count, "Supervisor step");
            step = match step {
                Step::Planning => self.plan(&brief, state, cancel, deadline).await,
                Step::Dispatching(batch) => {
                    Step::Aggregating(self.dispatch(batch, state, cancel, deadline, sink).await)
                }
                Step::Aggregating(outcomes) => {
                    self.aggregate(outcomes, state, sink);
                    Step::Planning
                }
                Step::Complete(reason) => {
                    info!(round = state.round_count, reason = ?reason, "Research complete");
                    state.completion = Some(reason.clone());
                    sink.emit(ProgressEvent::ResearchCompleted {
                        reason: reason.clone(),
                    });
                    return Ok(reason);
                }
            };
        }
    }

    async fn plan(
        &self,
        brief: &ResearchBrief,
        state: &mut SessionState,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Step {
        if cancel.is_cancelled() || Instant::now() >= deadline {
            return Step::Complete(CompletionReason::SessionTimeout);
        }
        if state.budget.is_exhausted() {
            warn!(spent = state.budget.tokens_spent, "Session token budget exhausted");
            return Step::Complete(CompletionReason::TokenBudgetExhausted);
        }

        let at_ceiling = state.round_count >= self.config.max_rounds;
        if at_ceiling && self.config.completion_tie_break == CompletionTieBreak::CeilingWins {
            info!(rounds = state.round_count, "Round ceiling reached");
            return Step::Complete(CompletionReason::RoundCeiling {
                rounds: state.round_count,
            });
        }

        let next_round = state.round_count + 1;
        let messages = vec![
            Message::system(&ResearchPrompts::supervisor(
                SupervisorDecision::NAME,
                brief,
                next_round.min(self.config.max_rounds),
                self.config.max_rounds,
                self.config.max_subtopics_per_round,
            )),
            Message::user(&ResearchPrompts::findings_digest(state.findings())),
        ];

        let decided = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Complete(CompletionReason::SessionTimeout),
            decided = decide::<SupervisorDecision>(self.llm.as_ref(), &messages, self.llm_config.as_ref()) => decided,
        };

        let decision = match decided {
            Ok(Decided { decision, usage }) => {
                state.ledger.record_llm("plan", &self.model(), &usage);
                state.budget.charge(usage.total_tokens);
                decision
            }
            Err(error) if state.findings().is_empty() && !at_ceiling => {
                warn!(error = %error, "Planning failed, delegating one sub-topic per question");
                let fallback = brief
                    .clarified_questions
                    .iter()
                    .map(|q| PlannedSubTopic {
                        description: q.clone(),
                        rationale: "Question from the research brief".to_string(),
                    })
                    .collect();
                SupervisorDecision::Delegate { subtopics: fallback }
            }
            Err(error) => {
                warn!(error = %error, "Planning failed, completing with existing findings");
                return Step::Complete(CompletionReason::PlanningFailed {
                    message: error.to_string(),
                });
            }
        };

        match decision {
            SupervisorDecision::ResearchComplete { reason } => {
                Step::Complete(CompletionReason::Satisfied { rationale: reason })
            }
            SupervisorDecision::Delegate { .. } if at_ceiling => {
                info!(rounds = state.round_count, "Round ceiling reached, ignoring further delegation");
                Step::Complete(CompletionReason::RoundCeiling {
                    rounds: state.round_count,
                })
            }
            SupervisorDecision::Delegate { subtopics } => {
                let batch = self.assign(next_round, subtopics);
                if batch.is_empty() {
                    Step::Complete(CompletionReason::Satisfied {
                        rationale: "No further sub-topics to research".to_string(),
                    })
                } else {
                    Step::Dispatching(batch)
                }
            }
        }
    }

    /// Number, dedup and cap a proposed batch.
    fn assign(&self, round: u32, planned: Vec<PlannedSubTopic>) -> Vec<SubTopicAssignment> {
        let limit = self.config.max_subtopics_per_round;
        let mut seen = HashSet::new();
        let candidates: Vec<PlannedSubTopic> = planned
            .into_iter()
            .filter(|p| !p.description.trim().is_empty())
            .filter(|p| seen.insert(p.description.trim().to_lowercase()))
            .collect();

        if candidates.len() > limit {
            warn!(proposed = candidates.len(), limit, "Batch exceeds per-round limit, truncating");
        }

        candidates
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, p)| SubTopicAssignment {
                id: SubTopicId::new(round, i as u32 + 1),
                description: p.description.trim().to_string(),
                rationale: p.rationale.trim().to_string(),
            })
            .collect()
    }

    async fn dispatch(
        &self,
        batch: Vec<SubTopicAssignment>,
        state: &SessionState,
        cancel: &CancellationToken,
        deadline: Instant,
        sink: &dyn ProgressSink,
    ) -> Vec<WorkerOutcome> {
        let round = state.round_count + 1;
        let concurrency = self.config.effective_concurrency();
        info!(round, workers = batch.len(), concurrency, "Dispatching workers");

        // What the session has left is shared by the whole round, not granted to each worker.
        let round_budget = state.budget.remaining().map(RoundBudget::new);
        let worker = self
            .worker
            .clone()
            .with_token_budget(self.config.worker_token_budget)
            .with_round_budget(round_budget);

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut set = JoinSet::new();

        for assignment in &batch {
            sink.emit(ProgressEvent::SubTopicAssigned {
                round,
                subtopic: assignment.clone(),
            });

            let worker = worker.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.child_token();
            let ledger = state.ledger.fork();
            let assignment = assignment.clone();
            let worker_timeout = self.config.worker_timeout;

            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return WorkerOutcome {
                            finding: Finding::failed(&assignment, IncompleteCause::Cancelled),
                            ledger,
                            tool_calls: 0,
                        }
                    }
                };
                let worker_deadline = (Instant::now() + worker_timeout).min(deadline);
                worker.run(assignment, cancel, worker_deadline, ledger).await
            });
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    sink.emit(ProgressEvent::WorkerFinished {
                        subtopic_id: outcome.finding.subtopic_id,
                        partial: outcome.finding.is_partial(),
                        citations: outcome.finding.citations.len(),
                    });
                    outcomes.push(outcome);
                }
                Err(error) => warn!(round, error = %error, "Worker task failed"),
            }
        }

        // A worker task that died still owes its sub-topic a finding.
        for assignment in &batch {
            if !outcomes.iter().any(|o| o.finding.subtopic_id == assignment.id) {
                let finding = Finding::failed(
                    assignment,
                    IncompleteCause::BackendFailure {
                        message: "worker task aborted".to_string(),
                    },
                );
                sink.emit(ProgressEvent::WorkerFinished {
                    subtopic_id: assignment.id,
                    partial: true,
                    citations: 0,
                });
                outcomes.push(WorkerOutcome {
                    finding,
                    ledger: state.ledger.fork(),
                    tool_calls: 0,
                });
            }
        }

        outcomes.sort_by_key(|o| o.finding.subtopic_id);
        outcomes
    }

    fn aggregate(&self, outcomes: Vec<WorkerOutcome>, state: &mut SessionState, sink: &dyn ProgressSink) {
        let mut partial = 0usize;
        for outcome in outcomes {
            state.budget.charge(outcome.ledger.total_tokens());
            state.ledger.merge(outcome.ledger);
            if outcome.finding.is_partial() {
                partial += 1;
            }
            state.record_finding(outcome.finding);
        }
        state.round_count += 1;

        info!(
            round = state.round_count,
            findings = state.findings().len(),
            partial,
            tokens_spent = state.budget.tokens_spent,
            "Round aggregated"
        );
        sink.emit(ProgressEvent::RoundCompleted {
            round: state.round_count,
            findings: state.findings().len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LLMError, ToolError};
    use crate::gateway::{DynToolProvider, SourceRef, ToolDefinition, ToolOutput, ToolProvider};
    use crate::llm::{LLMResponse, TokenUsage};
    use crate::research::state::{FindingStatus, SessionBudget};
    use crate::research::worker::CompressedResearch;
    use crate::session::NoProgress;
    use crate::state::{ConversationTurn, Role, ToolCall};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Plans from a script; workers search once and then stop.
    struct RoutingLLM {
        plans: Mutex<Vec<Value>>,
        last_plan: Value,
        plan_calls: AtomicUsize,
    }

    impl RoutingLLM {
        fn new(plans: Vec<Value>) -> Arc<Self> {
            let last_plan = plans
                .last()
                .cloned()
                .unwrap_or_else(|| json!({"decision": "research_complete", "reason": "done"}));
            Arc::new(Self {
                plans: Mutex::new(plans.into_iter().rev().collect()),
                last_plan,
                plan_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for RoutingLLM {
        async fn complete(
            &self,
            messages: &[Message],
            tools: &[ToolDefinition],
            _config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, LLMError> {
            let topic = messages.get(1).map(|m| m.content.clone()).unwrap_or_default();

            if tools.iter().any(|t| t.name == SupervisorDecision::NAME) {
                self.plan_calls.fetch_add(1, Ordering::SeqCst);
                let plan = self.plans.lock().unwrap().pop().unwrap_or_else(|| self.last_plan.clone());
                return Ok(LLMResponse::new(Message::assistant_with_tool_calls(
                    "",
                    vec![ToolCall::new("p", SupervisorDecision::NAME, plan)],
                )));
            }
            if tools.iter().any(|t| t.name == CompressedResearch::NAME) {
                let args = json!({
                    "summary": format!("Summary of {}", topic),
                    "citations": [{"source_id": format!("src:{}", topic)}]
                });
                return Ok(LLMResponse::new(Message::assistant_with_tool_calls(
                    "",
                    vec![ToolCall::new("s", CompressedResearch::NAME, args)],
                )));
            }
            if messages.last().map(|m| m.role) == Some(Role::Tool) {
                return Ok(LLMResponse::new(Message::assistant("done")));
            }
            Ok(LLMResponse::new(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("c1", "web_search", json!({"query": topic}))],
            )))
        }

        fn name(&self) -> &str {
            "routing"
        }

        fn default_model(&self) -> &str {
            "routing-model"
        }
    }

    /// Reports a fixed 100 tokens for every call it forwards.
    struct Metered(Arc<RoutingLLM>);

    #[async_trait]
    impl LLMProvider for Metered {
        async fn complete(
            &self,
            messages: &[Message],
            tools: &[ToolDefinition],
            config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, LLMError> {
            let response = self.0.complete(messages, tools, config).await?;
            Ok(response.with_usage(TokenUsage::new(80, 20)))
        }

        fn name(&self) -> &str {
            "metered"
        }

        fn default_model(&self) -> &str {
            "metered-model"
        }
    }

    /// Search provider that tracks how many calls overlap.
    #[derive(Default)]
    struct CountingSearch {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ToolProvider for CountingSearch {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "web_search".into(),
                description: "search".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let query = arguments["query"].as_str().unwrap_or_default().to_string();
            Ok(ToolOutput::text(format!("results for {}", query))
                .with_sources(vec![SourceRef::new(format!("src:{}", query), query)]))
        }
    }

    fn delegate(topics: &[&str]) -> Value {
        let subtopics: Vec<Value> = topics
            .iter()
            .map(|t| json!({"description": t, "rationale": "needed"}))
            .collect();
        json!({"decision": "delegate", "subtopics": subtopics})
    }

    fn complete() -> Value {
        json!({"decision": "research_complete", "reason": "criteria met"})
    }

    fn researching_state() -> SessionState {
        let request = "Compare GDP growth in France and Germany";
        let mut state = SessionState::new(request, vec![ConversationTurn::user(request)], None);
        state.brief = Some(ResearchBrief::new(
            request,
            vec!["France GDP growth".into(), "Germany GDP growth".into()],
            "Both countries covered",
        ));
        state.transition(SessionPhase::Researching, "start research").unwrap();
        state
    }

    fn setup(plans: Vec<Value>, config: ResearchConfig) -> (Arc<RoutingLLM>, Arc<CountingSearch>, Supervisor) {
        let llm = RoutingLLM::new(plans);
        let search = Arc::new(CountingSearch::default());
        let provider: DynToolProvider = search.clone();
        let gateway = ToolGateway::new().with_provider(provider);
        let supervisor = Supervisor::new(llm.clone(), gateway, &config);
        (llm, search, supervisor)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_two_subtopics_then_complete() {
        let (llm, _, supervisor) = setup(
            vec![delegate(&["France GDP growth", "Germany GDP growth"]), complete()],
            ResearchConfig::default(),
        );
        let mut state = researching_state();

        let reason = supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(reason, CompletionReason::Satisfied { rationale: "criteria met".into() });
        assert_eq!(state.round_count, 1);
        assert_eq!(state.findings().len(), 2);
        assert_eq!(state.findings()[0].subtopic_id.to_string(), "st-1-1");
        assert_eq!(state.findings()[0].citations[0].source_id, "src:France GDP growth");
        assert_eq!(state.findings()[1].citations[0].source_id, "src:Germany GDP growth");
        assert_eq!(llm.plan_calls.load(Ordering::SeqCst), 2);
        assert!(state.budget.tokens_spent > 0);
    }

    #[tokio::test]
    async fn test_ceiling_wins_over_judgment() {
        let config = ResearchConfig::default().with_max_rounds(2);
        let (llm, _, supervisor) = setup(vec![delegate(&["More on France"])], config);
        let mut state = researching_state();

        let reason = supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(reason, CompletionReason::RoundCeiling { rounds: 2 });
        assert_eq!(state.round_count, 2);
        assert_eq!(llm.plan_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_judgment_wins_still_bounded() {
        let config = ResearchConfig::default()
            .with_max_rounds(1)
            .with_completion_tie_break(CompletionTieBreak::JudgmentWins);
        let (llm, _, supervisor) = setup(vec![delegate(&["France"])], config);
        let mut state = researching_state();

        let reason = supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(reason, CompletionReason::RoundCeiling { rounds: 1 });
        assert_eq!(state.round_count, 1);
        assert_eq!(llm.plan_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_judgment_wins_accepts_completion_at_ceiling() {
        let config = ResearchConfig::default()
            .with_max_rounds(1)
            .with_completion_tie_break(CompletionTieBreak::JudgmentWins);
        let (_, _, supervisor) = setup(vec![delegate(&["France"]), complete()], config);
        let mut state = researching_state();

        let reason = supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert!(!reason.is_forced());
    }

    #[tokio::test]
    async fn test_batch_truncated_and_concurrency_bounded() {
        let config = ResearchConfig::default()
            .with_max_subtopics_per_round(3)
            .with_max_concurrent_workers(2);
        let (_, search, supervisor) = setup(vec![delegate(&["a", "b", "c", "d", "e"]), complete()], config);
        let mut state = researching_state();

        supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(state.findings().len(), 3);
        assert!(search.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_delegate_completes() {
        let (_, _, supervisor) = setup(vec![delegate(&[])], ResearchConfig::default());
        let mut state = researching_state();

        let reason = supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert!(matches!(reason, CompletionReason::Satisfied { .. }));
        assert!(state.findings().is_empty());
    }

    #[tokio::test]
    async fn test_session_budget_forces_completion() {
        let config = ResearchConfig::default().with_max_rounds(5);
        let (_, _, supervisor) = setup(vec![delegate(&["France"])], config);
        let mut state = researching_state();
        state.budget = SessionBudget::new(Some(50));

        let reason = supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(reason, CompletionReason::TokenBudgetExhausted);
        assert!(state.round_count < 5);
    }

    #[tokio::test]
    async fn test_cancelled_session_completes_with_timeout() {
        let (_, _, supervisor) = setup(vec![delegate(&["France"])], ResearchConfig::default());
        let mut state = researching_state();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reason = supervisor
            .run(&mut state, &cancel, far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(reason, CompletionReason::SessionTimeout);
        assert_eq!(state.round_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_plan_falls_back_to_brief_questions() {
        let (_, _, supervisor) = setup(
            vec![json!({"decision": "dance"}), complete()],
            ResearchConfig::default(),
        );
        let mut state = researching_state();

        supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        let topics: Vec<&str> = state.findings().iter().map(|f| f.topic.as_str()).collect();
        assert_eq!(topics, vec!["France GDP growth", "Germany GDP growth"]);
    }

    #[tokio::test]
    async fn test_requires_researching_phase() {
        let (_, _, supervisor) = setup(vec![], ResearchConfig::default());
        let mut state = SessionState::new("q", vec![], None);

        let result = supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await;
        assert!(matches!(result, Err(ResearchError::InvalidPhaseTransition { .. })));
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let (_, _, supervisor) = setup(vec![delegate(&["France"]), complete()], ResearchConfig::default());
        let mut state = researching_state();
        let events = Mutex::new(Vec::new());
        let sink = |event: ProgressEvent| events.lock().unwrap().push(event);

        supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &sink)
            .await
            .unwrap();

        let events = events.into_inner().unwrap();
        assert!(matches!(events[0], ProgressEvent::SubTopicAssigned { round: 1, .. }));
        assert!(matches!(events[1], ProgressEvent::WorkerFinished { partial: false, .. }));
        assert!(matches!(events[2], ProgressEvent::RoundCompleted { round: 1, findings: 1 }));
        assert!(matches!(events[3], ProgressEvent::ResearchCompleted { .. }));
    }

    fn metered_run_state(limit: u64) -> SessionState {
        let mut state = researching_state();
        state.budget = SessionBudget::new(Some(limit));
        state
    }

    fn metered_supervisor(config: &ResearchConfig) -> Supervisor {
        let llm = Arc::new(Metered(RoutingLLM::new(vec![delegate(&["a", "b", "c", "d", "e"])])));
        let provider: DynToolProvider = Arc::new(CountingSearch::default());
        Supervisor::new(llm, ToolGateway::new().with_provider(provider), config)
    }

    #[tokio::test]
    async fn test_round_shares_session_budget_across_workers() {
        let config = ResearchConfig::default()
            .with_max_rounds(1)
            .with_max_concurrent_workers(1);
        let supervisor = metered_supervisor(&config);
        let mut state = metered_run_state(500);

        supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        // plan 100, first worker 300, second worker one call before the round runs dry
        assert!(state.budget.tokens_spent <= 500 + 100, "spent {}", state.budget.tokens_spent);
        assert_eq!(state.findings().len(), 5);
        assert_eq!(state.findings()[0].status, FindingStatus::Complete);
        let stopped = state
            .findings()
            .iter()
            .filter(|f| f.incomplete_cause() == Some(&IncompleteCause::TokenBudgetExceeded { limit: 400 }))
            .count();
        assert_eq!(stopped, 4);
    }

    #[tokio::test]
    async fn test_concurrent_round_overshoot_bounded_by_in_flight_calls() {
        let config = ResearchConfig::default().with_max_rounds(1);
        let concurrency = config.effective_concurrency() as u64;
        let supervisor = metered_supervisor(&config);
        let mut state = metered_run_state(500);

        supervisor
            .run(&mut state, &CancellationToken::new(), far_deadline(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(state.findings().len(), 5);
        assert!(state.budget.tokens_spent <= 500 + concurrency * 100);
        assert!(state.findings().iter().any(|f| f.is_partial()));
    }
}
