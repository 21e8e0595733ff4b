// src/error.rs
//! 에러 타입 정의
//!
//! Error taxonomy for the research pipeline. Tool-level and budget-level
//! failures are absorbed inside the pipeline; only [`ResearchError`] reaches
//! the caller of [`crate::session::ResearchEngine`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::research::state::Report;
use crate::session::SessionId;

/// Normalized tool failure kind.
///
/// Carried as the cause of partial findings and printed in reports, so it is
/// `Copy` and serializable while [`ToolError`] keeps the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Timeout,
    Unavailable,
    InvalidArguments,
    RateLimited,
    Unknown,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolErrorKind::Timeout => "Timeout",
            ToolErrorKind::Unavailable => "Unavailable",
            ToolErrorKind::InvalidArguments => "InvalidArguments",
            ToolErrorKind::RateLimited => "RateLimited",
            ToolErrorKind::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// 도구 호출 에러
///
/// Every provider adapter maps its own failures onto these five variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool call timed out after {0} ms")]
    Timeout(u64),

    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Unknown tool error: {0}")]
    Unknown(String),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::Timeout(_) => ToolErrorKind::Timeout,
            ToolError::Unavailable(_) => ToolErrorKind::Unavailable,
            ToolError::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
            ToolError::RateLimited(_) => ToolErrorKind::RateLimited,
            ToolError::Unknown(_) => ToolErrorKind::Unknown,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ToolError::RateLimited(_))
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}

/// 언어 모델 호출 에러
#[derive(Error, Debug, Clone)]
pub enum LLMError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Structured decision failure.
///
/// Raised when the decision backend errors, answers without a decision, or
/// answers with something that does not validate against the decision type.
#[derive(Error, Debug, Clone)]
pub enum DecisionError {
    #[error("Decision backend error: {0}")]
    Backend(#[from] LLMError),

    #[error("No '{decision}' decision found in response")]
    NoDecision { decision: &'static str },

    #[error("Malformed '{decision}' decision: {reason}")]
    Malformed {
        decision: &'static str,
        reason: String,
    },
}

/// Scope clarification failure.
#[derive(Error, Debug, Clone)]
#[error("Scope clarification failed: {0}")]
pub struct ScopeError(#[from] pub DecisionError);

/// No findings reached the synthesizer.
///
/// The minimal report explaining the situation is still produced and handed
/// back with the error.
#[derive(Error, Debug, Clone)]
#[error("No findings were produced for: {}", .report.question)]
pub struct EmptyResearchError {
    pub report: Box<Report>,
}

/// Caller-facing error for session operations.
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Invalid phase transition: cannot {operation} while session is {from}")]
    InvalidPhaseTransition {
        from: String,
        operation: &'static str,
    },

    #[error("Session {0} is already being driven by another caller")]
    SessionBusy(SessionId),

    #[error("Research request is empty")]
    EmptyRequest,

    #[error("Configuration error: {0}")]
    Config(String),
}
