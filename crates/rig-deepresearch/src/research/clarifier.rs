//! Scope clarifier
//!
//! Decides whether a request needs a clarifying question before research
//! starts, and turns it into a [`ResearchBrief`] once it does not.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::prompts::ResearchPrompts;
use super::state::{ResearchBrief, SessionPhase, SessionState};
use crate::config::{ResearchConfig, ScopeFailurePolicy};
use crate::error::{DecisionError, ResearchError, ScopeError};
use crate::llm::{decide, Decided, Decision, LLMConfig, LLMProvider};
use crate::state::{ConversationTurn, Message};

/// The clarifier's structured decision. Exactly one of the two outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ClarifierDecision {
    NeedsClarification {
        question: String,
    },
    BriefReady {
        #[serde(default)]
        clarified_questions: Vec<String>,
        success_criteria: String,
    },
}

impl Decision for ClarifierDecision {
    const NAME: &'static str = "clarify_scope";

    fn description() -> &'static str {
        "Either ask the user one clarifying question or produce the research brief."
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "decision": {
                    "type": "string",
                    "enum": ["needs_clarification", "brief_ready"]
                },
                "question": {
                    "type": "string",
                    "description": "The clarifying question (needs_clarification only)"
                },
                "clarified_questions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Questions the research must answer (brief_ready only)"
                },
                "success_criteria": {
                    "type": "string",
                    "description": "How to judge the research complete (brief_ready only)"
                }
            },
            "required": ["decision"]
        })
    }
}

/// Result of one clarification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarifyOutcome {
    /// Session parks in CLARIFYING until the user answers
    NeedsClarification(String),
    /// Session moves on to RESEARCHING
    BriefReady(ResearchBrief),
}

pub struct ScopeClarifier {
    llm: Arc<dyn LLMProvider>,
    llm_config: Option<LLMConfig>,
    max_clarification_rounds: u32,
    failure_policy: ScopeFailurePolicy,
}

impl ScopeClarifier {
    pub fn new(llm: Arc<dyn LLMProvider>, config: &ResearchConfig) -> Self {
        Self {
            llm,
            llm_config: LLMConfig::for_model(config.model.as_deref()),
            max_clarification_rounds: config.max_clarification_rounds,
            failure_policy: config.scope_failure_policy,
        }
    }

    /// Ask the backend for a scope decision.
    ///
    /// Once `rounds_asked` reaches the cap a clarification answer is turned
    /// into a best-effort brief instead of another question.
    pub async fn clarify(
        &self,
        request: &str,
        history: &[ConversationTurn],
        rounds_asked: u32,
    ) -> Result<Decided<ClarifyOutcome>, ScopeError> {
        let can_ask = rounds_asked < self.max_clarification_rounds;

        let mut messages = vec![Message::system(&ResearchPrompts::clarifier(
            ClarifierDecision::NAME,
            can_ask,
        ))];
        messages.extend(history.iter().map(ConversationTurn::to_message));

        let Decided { decision, usage } =
            decide::<ClarifierDecision>(self.llm.as_ref(), &messages, self.llm_config.as_ref())
                .await?;

        let outcome = match decision {
            ClarifierDecision::NeedsClarification { question } if question.trim().is_empty() => {
                return Err(ScopeError(DecisionError::Malformed {
                    decision: ClarifierDecision::NAME,
                    reason: "empty clarification question".to_string(),
                }));
            }
            ClarifierDecision::NeedsClarification { question } if can_ask => {
                ClarifyOutcome::NeedsClarification(question.trim().to_string())
            }
            ClarifierDecision::NeedsClarification { .. } => {
                info!(rounds_asked, "Clarification cap reached, using best-effort brief");
                ClarifyOutcome::BriefReady(ResearchBrief::best_effort(request, history))
            }
            ClarifierDecision::BriefReady {
                clarified_questions,
                success_criteria,
            } => {
                let mut questions: Vec<String> = clarified_questions
                    .into_iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect();
                if questions.is_empty() {
                    questions.push(request.trim().to_string());
                }
                ClarifyOutcome::BriefReady(ResearchBrief::new(request.trim(), questions, success_criteria))
            }
        };

        Ok(Decided {
            decision: outcome,
            usage,
        })
    }

    /// Run one clarification step against a session in CLARIFYING.
    pub async fn advance(&self, state: &mut SessionState) -> Result<(), ResearchError> {
        if state.phase != SessionPhase::Clarifying {
            return Err(ResearchError::InvalidPhaseTransition {
                from: state.phase.to_string(),
                operation: "clarify scope",
            });
        }

        let model = self.llm.model_for(self.llm_config.as_ref());

        match self
            .clarify(&state.request, &state.history, state.clarification_rounds)
            .await
        {
            Ok(Decided { decision, usage }) => {
                state.ledger.record_llm("clarify", &model, &usage);
                state.budget.charge(usage.total_tokens);

                match decision {
                    ClarifyOutcome::NeedsClarification(question) => {
                        info!(round = state.clarification_rounds + 1, "Clarification requested");
                        state.history.push(ConversationTurn::assistant(question.clone()));
                        state.pending_question = Some(question);
                        state.clarification_rounds += 1;
                        state.transition(SessionPhase::Clarifying, "ask clarification")?;
                    }
                    ClarifyOutcome::BriefReady(brief) => {
                        info!(questions = brief.clarified_questions.len(), "Research brief ready");
                        state.pending_question = None;
                        state.brief = Some(brief);
                        state.transition(SessionPhase::Researching, "start research")?;
                    }
                }
            }
            Err(error) => match self.failure_policy {
                ScopeFailurePolicy::Fail => {
                    warn!(error = %error, "Scope clarification failed");
                    state.fail(error.to_string());
                }
                ScopeFailurePolicy::ProceedWithDefaultBrief => {
                    warn!(error = %error, "Scope clarification failed, proceeding with default brief");
                    state.pending_question = None;
                    state.brief = Some(ResearchBrief::from_request(&state.request));
                    state.transition(SessionPhase::Researching, "start research")?;
                }
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LLMError;
    use crate::gateway::ToolDefinition;
    use crate::llm::LLMResponse;
    use crate::state::ToolCall;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted decisions in order.
    struct ScriptedLLM {
        replies: Mutex<Vec<Result<Value, LLMError>>>,
    }

    impl ScriptedLLM {
        fn new(replies: Vec<Result<Value, LLMError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
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
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LLMError::Request("script exhausted".into())))?;
            Ok(LLMResponse::new(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("c1", ClarifierDecision::NAME, reply)],
            )))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }
    }

    fn session(request: &str) -> SessionState {
        SessionState::new(request, vec![ConversationTurn::user(request)], None)
    }

    fn ask(question: &str) -> Result<Value, LLMError> {
        Ok(json!({"decision": "needs_clarification", "question": question}))
    }

    #[tokio::test]
    async fn test_brief_ready_moves_to_researching() {
        let llm = ScriptedLLM::new(vec![Ok(json!({
            "decision": "brief_ready",
            "clarified_questions": ["France GDP growth", "Germany GDP growth"],
            "success_criteria": "Growth figures for both"
        }))]);
        let clarifier = ScopeClarifier::new(llm, &ResearchConfig::default());
        let mut state = session("Compare GDP growth in France and Germany");

        clarifier.advance(&mut state).await.unwrap();

        assert_eq!(state.phase, SessionPhase::Researching);
        let brief = state.brief.unwrap();
        assert_eq!(brief.clarified_questions.len(), 2);
        assert_eq!(state.ledger.summary().llm_calls, 1);
    }

    #[tokio::test]
    async fn test_question_parks_session() {
        let llm = ScriptedLLM::new(vec![ask("Which countries?")]);
        let clarifier = ScopeClarifier::new(llm, &ResearchConfig::default());
        let mut state = session("Compare GDP growth");

        clarifier.advance(&mut state).await.unwrap();

        assert_eq!(state.phase, SessionPhase::Clarifying);
        assert_eq!(state.pending_question.as_deref(), Some("Which countries?"));
        assert_eq!(state.clarification_rounds, 1);
        assert_eq!(state.history.last(), Some(&ConversationTurn::assistant("Which countries?")));
    }

    #[tokio::test]
    async fn test_second_question_becomes_best_effort_brief() {
        let llm = ScriptedLLM::new(vec![ask("Which countries?"), ask("Which years?")]);
        let clarifier = ScopeClarifier::new(llm, &ResearchConfig::default());
        let mut state = session("Compare GDP growth");

        clarifier.advance(&mut state).await.unwrap();
        state.history.push(ConversationTurn::user("France and Germany"));
        clarifier.advance(&mut state).await.unwrap();

        assert_eq!(state.phase, SessionPhase::Researching);
        assert_eq!(state.clarification_rounds, 1);
        assert!(state.pending_question.is_none());
        let brief = state.brief.unwrap();
        assert!(brief
            .clarified_questions
            .contains(&"User context: France and Germany".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_decision_fails_session() {
        let llm = ScriptedLLM::new(vec![Ok(json!({"decision": "maybe"}))]);
        let clarifier = ScopeClarifier::new(llm, &ResearchConfig::default());
        let mut state = session("Compare GDP growth");

        clarifier.advance(&mut state).await.unwrap();

        assert_eq!(state.phase, SessionPhase::Failed);
        let failure = state.failure.unwrap();
        assert!(failure.error.contains("Scope clarification failed"));
        assert_eq!(
            failure.fallback_brief.unwrap().original_request,
            "Compare GDP growth"
        );
    }

    #[tokio::test]
    async fn test_malformed_decision_can_proceed_with_default_brief() {
        let llm = ScriptedLLM::new(vec![Err(LLMError::InvalidResponse("garbage".into()))]);
        let config =
            ResearchConfig::default().with_scope_failure_policy(ScopeFailurePolicy::ProceedWithDefaultBrief);
        let clarifier = ScopeClarifier::new(llm, &config);
        let mut state = session("Compare GDP growth");

        clarifier.advance(&mut state).await.unwrap();

        assert_eq!(state.phase, SessionPhase::Researching);
        assert_eq!(
            state.brief.unwrap(),
            ResearchBrief::from_request("Compare GDP growth")
        );
    }

    #[tokio::test]
    async fn test_zero_cap_never_asks() {
        let llm = ScriptedLLM::new(vec![ask("Which countries?")]);
        let config = ResearchConfig::default().with_max_clarification_rounds(0);
        let clarifier = ScopeClarifier::new(llm, &config);
        let mut state = session("Compare GDP growth");

        clarifier.advance(&mut state).await.unwrap();

        assert_eq!(state.phase, SessionPhase::Researching);
        assert_eq!(state.clarification_rounds, 0);
    }

    #[tokio::test]
    async fn test_advance_outside_clarifying_is_rejected() {
        let llm = ScriptedLLM::new(vec![]);
        let clarifier = ScopeClarifier::new(llm, &ResearchConfig::default());
        let mut state = session("q");
        state.transition(SessionPhase::Researching, "start research").unwrap();

        assert!(matches!(
            clarifier.advance(&mut state).await,
            Err(ResearchError::InvalidPhaseTransition { .. })
        ));
    }
}
