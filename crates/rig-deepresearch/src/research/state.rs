//! Research session data model
//!
//! [`SessionState`] travels through the pipeline by value: the clarifier,
//! the supervisor and the synthesizer each take it, mutate it, and hand it
//! back. Nothing here is shared between concurrent workers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::{CostLedger, CostSummary};
use crate::error::{ResearchError, ToolErrorKind};
use crate::gateway::SourceRef;
use crate::state::{ConversationTurn, Role};

/// Session phase.
///
/// Transitions only move forward; the single loop is CLARIFYING waiting on
/// the user and coming back to CLARIFYING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Clarifying,
    Researching,
    Writing,
    Done,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Done | SessionPhase::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            SessionPhase::Clarifying => 0,
            SessionPhase::Researching => 1,
            SessionPhase::Writing => 2,
            SessionPhase::Done | SessionPhase::Failed => 3,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self == SessionPhase::Clarifying && next == SessionPhase::Clarifying {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Clarifying => "CLARIFYING",
            SessionPhase::Researching => "RESEARCHING",
            SessionPhase::Writing => "WRITING",
            SessionPhase::Done => "DONE",
            SessionPhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Disambiguated statement of what is researched and how success is judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBrief {
    pub original_request: String,
    pub clarified_questions: Vec<String>,
    pub success_criteria: String,
}

impl ResearchBrief {
    pub fn new(
        original_request: impl Into<String>,
        clarified_questions: Vec<String>,
        success_criteria: impl Into<String>,
    ) -> Self {
        Self {
            original_request: original_request.into(),
            clarified_questions,
            success_criteria: success_criteria.into(),
        }
    }

    /// Brief built directly from the raw request, with no backend involved.
    pub fn from_request(request: &str) -> Self {
        Self::new(
            request.trim(),
            vec![request.trim().to_string()],
            "Answer the request directly, supported by cited sources.",
        )
    }

    /// Best-effort brief from the request and whatever the user has said so
    /// far. Used when clarification rounds are exhausted.
    pub fn best_effort(request: &str, history: &[ConversationTurn]) -> Self {
        let mut questions = vec![request.trim().to_string()];
        questions.extend(
            history
                .iter()
                .filter(|turn| turn.role == Role::User)
                .map(|turn| turn.content.trim())
                .filter(|content| !content.is_empty() && *content != request.trim())
                .map(|content| format!("User context: {}", content)),
        );
        Self::new(
            request.trim(),
            questions,
            "Answer the request as stated, noting any assumptions made where details were not provided.",
        )
    }
}

/// Sub-topic identity: the round it was issued in and its position.
///
/// Ordering follows issue order, which is how the report groups evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubTopicId {
    pub round: u32,
    pub index: u32,
}

impl SubTopicId {
    pub fn new(round: u32, index: u32) -> Self {
        Self { round, index }
    }
}

impl fmt::Display for SubTopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "st-{}-{}", self.round, self.index)
    }
}

/// One delegated sub-topic. Never mutated after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTopicAssignment {
    pub id: SubTopicId,
    pub description: String,
    pub rationale: String,
}

/// Pointer from a finding's summary to the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default)]
    pub title: String,
}

impl Citation {
    pub fn from_source(source: &SourceRef) -> Self {
        Self {
            source_id: source.source_id.clone(),
            locator: source.locator.clone(),
            title: source.title.clone(),
        }
    }
}

/// Why a worker stopped before judging its research sufficient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum IncompleteCause {
    /// Tool-call bound reached
    WorkerBudgetExceeded { max_tool_calls: usize },
    /// Worker token cap or the round's shared allowance reached
    TokenBudgetExceeded { limit: u64 },
    /// Tools failed and nothing usable was gathered
    ToolFailure { kind: ToolErrorKind },
    /// Per-worker timeout elapsed
    Timeout,
    /// Session time limit passed and the session cancelled the worker
    Cancelled,
    /// The backend failed or produced an unusable answer
    BackendFailure { message: String },
}

impl fmt::Display for IncompleteCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteCause::WorkerBudgetExceeded { max_tool_calls } => {
                write!(f, "WorkerBudgetExceeded (limit of {} tool calls)", max_tool_calls)
            }
            IncompleteCause::TokenBudgetExceeded { limit } => {
                write!(f, "WorkerBudgetExceeded (limit of {} tokens)", limit)
            }
            IncompleteCause::ToolFailure { kind } => write!(f, "{}", kind),
            IncompleteCause::Timeout => f.write_str("Timeout"),
            IncompleteCause::Cancelled => f.write_str("Cancelled (session time limit reached)"),
            IncompleteCause::BackendFailure { message } => write!(f, "BackendFailure: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FindingStatus {
    Complete,
    Partial { cause: IncompleteCause },
}

/// A worker's grounded summary for one sub-topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub subtopic_id: SubTopicId,
    /// The sub-topic description, kept for report headings
    pub topic: String,
    pub summary: String,
    pub citations: Vec<Citation>,
    pub status: FindingStatus,
}

impl Finding {
    pub fn is_partial(&self) -> bool {
        matches!(self.status, FindingStatus::Partial { .. })
    }

    pub fn incomplete_cause(&self) -> Option<&IncompleteCause> {
        match &self.status {
            FindingStatus::Partial { cause } => Some(cause),
            FindingStatus::Complete => None,
        }
    }

    /// Finding for a worker that produced nothing usable.
    pub fn failed(assignment: &SubTopicAssignment, cause: IncompleteCause) -> Self {
        Self {
            subtopic_id: assignment.id,
            topic: assignment.description.clone(),
            summary: format!("Incomplete: research stopped ({}).", cause),
            citations: Vec::new(),
            status: FindingStatus::Partial { cause },
        }
    }
}

/// Why the supervisor stopped issuing rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CompletionReason {
    /// The supervisor judged the success criteria satisfied
    Satisfied { rationale: String },
    /// Round ceiling reached
    RoundCeiling { rounds: u32 },
    /// Session token budget exhausted
    TokenBudgetExhausted,
    /// Session deadline passed
    SessionTimeout,
    /// The backend could not plan further rounds
    PlanningFailed { message: String },
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionReason::Satisfied { rationale } => write!(f, "success criteria met: {}", rationale),
            CompletionReason::RoundCeiling { rounds } => write!(f, "round ceiling reached after {} rounds", rounds),
            CompletionReason::TokenBudgetExhausted => f.write_str("token budget exhausted"),
            CompletionReason::SessionTimeout => f.write_str("session time limit reached"),
            CompletionReason::PlanningFailed { message } => write!(f, "planning failed: {}", message),
        }
    }
}

impl CompletionReason {
    /// Forced completions are flagged in the report.
    pub fn is_forced(&self) -> bool {
        !matches!(self, CompletionReason::Satisfied { .. })
    }
}

/// Token budget for a session. `remaining` only ever goes down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBudget {
    pub token_limit: Option<u64>,
    pub tokens_spent: u64,
}

impl SessionBudget {
    pub fn new(token_limit: Option<u64>) -> Self {
        Self {
            token_limit,
            tokens_spent: 0,
        }
    }

    pub fn charge(&mut self, tokens: u64) {
        self.tokens_spent = self.tokens_spent.saturating_add(tokens);
    }

    /// Tokens left, `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        self.token_limit
            .map(|limit| limit.saturating_sub(self.tokens_spent))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }
}

/// Why a session could not produce a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDescriptor {
    pub phase: SessionPhase,
    pub error: String,
    /// Brief built from the raw request, so the request is never lost
    pub fallback_brief: Option<ResearchBrief>,
}

/// State of one research session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub request: String,
    pub history: Vec<ConversationTurn>,
    /// Question surfaced to the user while CLARIFYING
    pub pending_question: Option<String>,
    pub clarification_rounds: u32,
    pub brief: Option<ResearchBrief>,
    findings: Vec<Finding>,
    pub round_count: u32,
    pub budget: SessionBudget,
    pub ledger: CostLedger,
    pub completion: Option<CompletionReason>,
    pub failure: Option<FailureDescriptor>,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(request: impl Into<String>, history: Vec<ConversationTurn>, token_limit: Option<u64>) -> Self {
        Self {
            phase: SessionPhase::Clarifying,
            request: request.into(),
            history,
            pending_question: None,
            clarification_rounds: 0,
            brief: None,
            findings: Vec::new(),
            round_count: 0,
            budget: SessionBudget::new(token_limit),
            ledger: CostLedger::default(),
            completion: None,
            failure: None,
            created_at: Utc::now(),
        }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Append a finding. Findings are never replaced or removed.
    pub fn record_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn transition(&mut self, next: SessionPhase, operation: &'static str) -> Result<(), ResearchError> {
        if !self.phase.can_transition_to(next) {
            return Err(ResearchError::InvalidPhaseTransition {
                from: self.phase.to_string(),
                operation,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Move to FAILED, keeping a fallback brief built from the raw request.
    pub fn fail(&mut self, error: impl Into<String>) {
        let fallback = self
            .brief
            .clone()
            .unwrap_or_else(|| ResearchBrief::from_request(&self.request));
        self.failure = Some(FailureDescriptor {
            phase: self.phase,
            error: error.into(),
            fallback_brief: Some(fallback),
        });
        self.pending_question = None;
        self.phase = SessionPhase::Failed;
    }
}

/// One numbered entry of the report's source list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCitation {
    pub number: usize,
    pub source_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

/// Evidence for one sub-topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSection {
    pub subtopic_id: SubTopicId,
    pub topic: String,
    pub summary: String,
    /// Numbers into [`Report::citations`]
    pub citation_numbers: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete: Option<String>,
}

/// Final research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub question: String,
    pub direct_answer: String,
    pub evidence: Vec<EvidenceSection>,
    pub citations: Vec<ReportCitation>,
    /// Set when any part of the research was forced or incomplete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_notice: Option<String>,
    /// Attached by the session after synthesis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CostSummary>,
}

impl Report {
    pub fn is_partial(&self) -> bool {
        self.partial_notice.is_some()
    }

    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Research Report: {}\n\n", self.question);

        if let Some(notice) = &self.partial_notice {
            out.push_str(&format!("> **{}**\n\n", notice));
        }

        out.push_str("## Answer\n\n");
        out.push_str(&self.direct_answer);
        out.push_str("\n\n");

        if !self.evidence.is_empty() {
            out.push_str("## Supporting Evidence\n\n");
            for section in &self.evidence {
                out.push_str(&format!("### {}\n\n{}", section.topic, section.summary));
                if !section.citation_numbers.is_empty() {
                    let refs: String = section
                        .citation_numbers
                        .iter()
                        .map(|n| format!("[{}]", n))
                        .collect();
                    out.push_str(&format!(" {}", refs));
                }
                out.push('\n');
                if let Some(incomplete) = &section.incomplete {
                    out.push_str(&format!("\n_Incomplete: {}_\n", incomplete));
                }
                out.push('\n');
            }
        }

        if !self.citations.is_empty() {
            out.push_str("## Sources\n\n");
            for citation in &self.citations {
                let title = if citation.title.is_empty() {
                    citation.source_id.as_str()
                } else {
                    citation.title.as_str()
                };
                match &citation.locator {
                    Some(locator) => out.push_str(&format!(
                        "[{}] {}: {} ({})\n",
                        citation.number, title, citation.source_id, locator
                    )),
                    None => out.push_str(&format!(
                        "[{}] {}: {}\n",
                        citation.number, title, citation.source_id
                    )),
                }
            }
        }

        if let Some(usage) = &self.usage {
            out.push_str(&format!(
                "\n---\n_{} LLM calls, {} tokens, {} searches, est. ${:.4}_\n",
                usage.llm_calls, usage.total_tokens, usage.searches, usage.total_cost_usd
            ));
        }

        out
    }
}
