//! Research sessions
//!
//! [`ResearchEngine`] is the entry point for callers (CLI, web UI, API). It
//! owns the sessions that are parked between calls; while a call drives a
//! session the state is checked out of the map, so exactly one component
//! mutates it at a time.
//!
//! ```text
//! start_session ──▶ CLARIFYING ◀──▶ submit_clarification
//!                       │
//!   run_to_completion ──┴──▶ RESEARCHING ──▶ WRITING ──▶ DONE
//!                       └──────────────────────────────▶ FAILED
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ResearchConfig;
use crate::cost::{CostLedger, PricingTable};
use crate::error::ResearchError;
use crate::gateway::ToolGateway;
use crate::llm::LLMProvider;
use crate::research::{
    synthesize, CompletionReason, FailureDescriptor, Report, ScopeClarifier, SessionPhase, SessionState,
    SubTopicAssignment, SubTopicId, Supervisor,
};
use crate::state::ConversationTurn;

/// Session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller's reference to a session held by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: SessionId,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Progress notifications for streaming UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    PhaseChanged {
        phase: SessionPhase,
    },
    ClarificationRequested {
        question: String,
    },
    SubTopicAssigned {
        round: u32,
        subtopic: SubTopicAssignment,
    },
    WorkerFinished {
        subtopic_id: SubTopicId,
        partial: bool,
        citations: usize,
    },
    RoundCompleted {
        round: u32,
        findings: usize,
    },
    ResearchCompleted {
        reason: CompletionReason,
    },
}

/// Receives progress events. Implemented for closures and unbounded senders.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// What `run_to_completion` delivers.
#[derive(Debug, Clone)]
pub enum ResearchOutcome {
    /// The session is parked until the user answers this question
    NeedsClarification(String),
    Report(Box<Report>),
    Failed(FailureDescriptor),
}

/// Held by the call that checked a session out. Dropping the call drops it.
type Lease = Arc<()>;

enum SessionSlot {
    Idle(Box<SessionState>),
    Running(Weak<()>),
}

impl SessionSlot {
    /// A checked-out session whose call was dropped; its state went with it.
    fn is_abandoned(&self) -> bool {
        matches!(self, SessionSlot::Running(lease) if lease.strong_count() == 0)
    }
}

/// Research orchestration engine.
pub struct ResearchEngine {
    clarifier: ScopeClarifier,
    supervisor: Supervisor,
    config: ResearchConfig,
    pricing: PricingTable,
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
}

impl ResearchEngine {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        gateway: ToolGateway,
        config: ResearchConfig,
    ) -> Result<Self, ResearchError> {
        config.validate()?;
        let gateway = gateway
            .with_call_timeout(config.tool_call_timeout)
            .with_rate_limit_backoff(config.rate_limit_backoff);

        info!(
            capabilities = ?gateway.capabilities(),
            max_rounds = config.max_rounds,
            max_subtopics = config.max_subtopics_per_round,
            "Research engine ready"
        );

        Ok(Self {
            clarifier: ScopeClarifier::new(llm.clone(), &config),
            supervisor: Supervisor::new(llm, gateway, &config),
            config,
            pricing: PricingTable::default(),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Start a session and run the first clarification step.
    pub async fn start_session(
        &self,
        request: &str,
        history: Vec<ConversationTurn>,
    ) -> Result<SessionHandle, ResearchError> {
        let request = request.trim();
        if request.is_empty() {
            return Err(ResearchError::EmptyRequest);
        }

        let id = SessionId::new();
        let mut history = history;
        history.push(ConversationTurn::user(request));

        let mut state = SessionState::new(request, history, self.config.session_token_budget);
        state.ledger = CostLedger::new(self.pricing.clone());
        info!(session_id = %id, "Session started");

        self.clarifier.advance(&mut state).await?;
        self.check_in(id, state).await;

        Ok(SessionHandle { id })
    }

    /// Answer the pending clarification question.
    pub async fn submit_clarification(
        &self,
        handle: &SessionHandle,
        answer: &str,
    ) -> Result<SessionState, ResearchError> {
        let (mut state, _lease) = self.check_out(handle.id).await?;

        if state.phase != SessionPhase::Clarifying || state.pending_question.is_none() {
            let from = state.phase.to_string();
            self.check_in(handle.id, state).await;
            return Err(ResearchError::InvalidPhaseTransition {
                from,
                operation: "submit clarification",
            });
        }

        info!(session_id = %handle.id, "Clarification received");
        state.history.push(ConversationTurn::user(answer.trim()));
        state.pending_question = None;

        let advanced = self.clarifier.advance(&mut state).await;
        let snapshot = state.clone();
        self.check_in(handle.id, state).await;
        advanced.map(|_| snapshot)
    }

    /// Drive the session to a report or a failure.
    ///
    /// A session still waiting on the user is left parked and its question
    /// returned. Delivered sessions are removed from the engine.
    pub async fn run_to_completion(
        &self,
        handle: &SessionHandle,
        sink: &dyn ProgressSink,
    ) -> Result<ResearchOutcome, ResearchError> {
        let id = handle.id;
        let (mut state, _lease) = self.check_out(id).await?;

        if state.phase == SessionPhase::Clarifying && state.pending_question.is_none() {
            if let Err(error) = self.clarifier.advance(&mut state).await {
                self.check_in(id, state).await;
                return Err(error);
            }
        }

        match state.phase {
            SessionPhase::Clarifying => {
                let question = state.pending_question.clone().unwrap_or_default();
                sink.emit(ProgressEvent::ClarificationRequested {
                    question: question.clone(),
                });
                self.check_in(id, state).await;
                return Ok(ResearchOutcome::NeedsClarification(question));
            }
            SessionPhase::Failed => {
                self.remove(id).await;
                return Ok(ResearchOutcome::Failed(failure_of(&state)));
            }
            SessionPhase::Researching => {}
            SessionPhase::Writing | SessionPhase::Done => {
                let from = state.phase.to_string();
                self.check_in(id, state).await;
                return Err(ResearchError::InvalidPhaseTransition {
                    from,
                    operation: "run to completion",
                });
            }
        }

        sink.emit(ProgressEvent::PhaseChanged {
            phase: SessionPhase::Researching,
        });

        let cancel = CancellationToken::new();
        let deadline = Instant::now() + self.config.session_timeout;
        // The timer also stops if this call is dropped mid-research.
        let timer_stop = CancellationToken::new();
        let timer_guard = timer_stop.clone().drop_guard();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer_stop.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!("Session time limit reached, cancelling workers");
                        cancel.cancel();
                    }
                }
            });
        }

        let researched = self.supervisor.run(&mut state, &cancel, deadline, sink).await;
        drop(timer_guard);
        let completion = match researched {
            Ok(reason) => reason,
            Err(error) => {
                self.check_in(id, state).await;
                return Err(error);
            }
        };

        if let Err(error) = state.transition(SessionPhase::Writing, "write report") {
            self.check_in(id, state).await;
            return Err(error);
        }
        sink.emit(ProgressEvent::PhaseChanged {
            phase: SessionPhase::Writing,
        });

        let brief = match state.brief.clone() {
            Some(brief) => brief,
            None => {
                state.fail("research finished without a brief");
                self.remove(id).await;
                return Ok(ResearchOutcome::Failed(failure_of(&state)));
            }
        };

        let mut report = match synthesize(&brief, state.findings(), Some(&completion)) {
            Ok(report) => report,
            Err(empty) => {
                warn!(session_id = %id, "No findings to synthesize, delivering minimal report");
                *empty.report
            }
        };
        report.usage = Some(state.ledger.summary());

        if let Err(error) = state.transition(SessionPhase::Done, "deliver report") {
            self.check_in(id, state).await;
            return Err(error);
        }
        sink.emit(ProgressEvent::PhaseChanged {
            phase: SessionPhase::Done,
        });
        info!(
            session_id = %id,
            rounds = state.round_count,
            findings = state.findings().len(),
            citations = report.citations.len(),
            partial = report.is_partial(),
            "Report delivered"
        );

        self.remove(id).await;
        Ok(ResearchOutcome::Report(Box::new(report)))
    }

    /// Snapshot of a parked session.
    pub async fn state(&self, handle: &SessionHandle) -> Result<SessionState, ResearchError> {
        match self.sessions.read().await.get(&handle.id) {
            Some(SessionSlot::Idle(state)) => Ok(state.as_ref().clone()),
            Some(slot) if slot.is_abandoned() => Err(ResearchError::SessionNotFound(handle.id)),
            Some(SessionSlot::Running(_)) => Err(ResearchError::SessionBusy(handle.id)),
            None => Err(ResearchError::SessionNotFound(handle.id)),
        }
    }

    /// Drop a session without delivering it.
    ///
    /// Also evicts a session whose driving call was dropped mid-run.
    pub async fn discard(&self, handle: &SessionHandle) -> Result<(), ResearchError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&handle.id) {
            Some(slot) if matches!(slot, SessionSlot::Idle(_)) || slot.is_abandoned() => {
                sessions.remove(&handle.id);
                info!(session_id = %handle.id, "Session discarded");
                Ok(())
            }
            Some(_) => Err(ResearchError::SessionBusy(handle.id)),
            None => Err(ResearchError::SessionNotFound(handle.id)),
        }
    }

    /// Number of live sessions held by the engine.
    pub async fn session_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|slot| !slot.is_abandoned())
            .count()
    }

    async fn check_out(&self, id: SessionId) -> Result<(SessionState, Lease), ResearchError> {
        let mut sessions = self.sessions.write().await;
        let abandoned = sessions
            .get(&id)
            .ok_or(ResearchError::SessionNotFound(id))?
            .is_abandoned();
        if abandoned {
            warn!(session_id = %id, "Evicting session whose run was dropped");
            sessions.remove(&id);
            return Err(ResearchError::SessionNotFound(id));
        }

        let slot = sessions
            .get_mut(&id)
            .ok_or(ResearchError::SessionNotFound(id))?;
        let lease = Lease::new(());
        match std::mem::replace(slot, SessionSlot::Running(Arc::downgrade(&lease))) {
            SessionSlot::Idle(state) => Ok((*state, lease)),
            running @ SessionSlot::Running(_) => {
                *slot = running;
                Err(ResearchError::SessionBusy(id))
            }
        }
    }

    async fn check_in(&self, id: SessionId, state: SessionState) {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, slot| !slot.is_abandoned());
        sessions.insert(id, SessionSlot::Idle(Box::new(state)));
    }

    async fn remove(&self, id: SessionId) {
        self.sessions.write().await.remove(&id);
    }
}

fn failure_of(state: &SessionState) -> FailureDescriptor {
    state.failure.clone().unwrap_or_else(|| FailureDescriptor {
        phase: state.phase,
        error: "session failed".to_string(),
        fallback_brief: state.brief.clone(),
    })
}
