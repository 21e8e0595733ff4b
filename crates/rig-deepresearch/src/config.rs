//! Research configuration
//!
//! All bounds, timeouts and policies of a research session. Durations are
//! written in humantime form (`"30s"`, `"15m"`) when serialized.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ResearchError;

/// What wins when the supervisor would keep researching but the round
/// ceiling has been reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTieBreak {
    /// The ceiling ends research without consulting the backend
    #[default]
    CeilingWins,
    /// The backend is asked once more; only a completion answer is accepted
    JudgmentWins,
}

/// What happens when the scope clarifier cannot produce a valid decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFailurePolicy {
    /// Session moves to FAILED, keeping a brief built from the raw request
    #[default]
    Fail,
    /// Research continues with the default brief
    ProceedWithDefaultBrief,
}

/// Research session configuration.
///
/// # Example
///
/// ```
/// use rig_deepresearch::ResearchConfig;
///
/// let config = ResearchConfig::default()
///     .with_max_rounds(2)
///     .with_max_subtopics_per_round(3);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.effective_concurrency(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Clarification questions asked before a best-effort brief is used
    pub max_clarification_rounds: u32,
    /// Supervisor round ceiling
    pub max_rounds: u32,
    /// Sub-topics issued per round (K)
    pub max_subtopics_per_round: usize,
    /// Workers in flight at once; never above K
    pub max_concurrent_workers: Option<usize>,
    /// Tool invocations per worker before a forced stop
    pub max_tool_calls_per_worker: usize,
    /// Tokens a single worker may spend
    pub worker_token_budget: Option<u64>,
    /// Tokens the whole session may spend
    pub session_token_budget: Option<u64>,
    #[serde(with = "humantime_serde")]
    pub tool_call_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub rate_limit_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub worker_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,
    pub completion_tie_break: CompletionTieBreak,
    pub scope_failure_policy: ScopeFailurePolicy,
    /// Model name passed to the backend and used for pricing
    pub model: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_clarification_rounds: 1,
            max_rounds: 3,
            max_subtopics_per_round: 5,
            max_concurrent_workers: None,
            max_tool_calls_per_worker: 6,
            worker_token_budget: None,
            session_token_budget: None,
            tool_call_timeout: Duration::from_secs(30),
            rate_limit_backoff: Duration::from_secs(1),
            worker_timeout: Duration::from_secs(180),
            session_timeout: Duration::from_secs(15 * 60),
            completion_tie_break: CompletionTieBreak::default(),
            scope_failure_policy: ScopeFailurePolicy::default(),
            model: None,
        }
    }
}

impl ResearchConfig {
    pub fn with_max_clarification_rounds(mut self, rounds: u32) -> Self {
        self.max_clarification_rounds = rounds;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_max_subtopics_per_round(mut self, k: usize) -> Self {
        self.max_subtopics_per_round = k;
        self
    }

    pub fn with_max_concurrent_workers(mut self, workers: usize) -> Self {
        self.max_concurrent_workers = Some(workers);
        self
    }

    pub fn with_max_tool_calls_per_worker(mut self, calls: usize) -> Self {
        self.max_tool_calls_per_worker = calls;
        self
    }

    pub fn with_worker_token_budget(mut self, tokens: u64) -> Self {
        self.worker_token_budget = Some(tokens);
        self
    }

    pub fn with_session_token_budget(mut self, tokens: u64) -> Self {
        self.session_token_budget = Some(tokens);
        self
    }

    pub fn with_tool_call_timeout(mut self, timeout: Duration) -> Self {
        self.tool_call_timeout = timeout;
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_completion_tie_break(mut self, policy: CompletionTieBreak) -> Self {
        self.completion_tie_break = policy;
        self
    }

    pub fn with_scope_failure_policy(mut self, policy: ScopeFailurePolicy) -> Self {
        self.scope_failure_policy = policy;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Workers allowed in flight: the configured value capped at K.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent_workers
            .unwrap_or(self.max_subtopics_per_round)
            .clamp(1, self.max_subtopics_per_round.max(1))
    }

    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.max_rounds == 0 {
            return Err(ResearchError::Config("max_rounds must be at least 1".into()));
        }
        if self.max_subtopics_per_round == 0 {
            return Err(ResearchError::Config(
                "max_subtopics_per_round must be at least 1".into(),
            ));
        }
        if self.max_concurrent_workers == Some(0) {
            return Err(ResearchError::Config(
                "max_concurrent_workers must be at least 1".into(),
            ));
        }
        if self.max_tool_calls_per_worker == 0 {
            return Err(ResearchError::Config(
                "max_tool_calls_per_worker must be at least 1".into(),
            ));
        }
        for (name, timeout) in [
            ("tool_call_timeout", self.tool_call_timeout),
            ("worker_timeout", self.worker_timeout),
            ("session_timeout", self.session_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ResearchError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }
}
