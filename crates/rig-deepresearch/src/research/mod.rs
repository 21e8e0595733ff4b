//! Research pipeline
//!
//! request → [`ScopeClarifier`] → brief → [`Supervisor`] rounds of
//! [`ResearchWorker`]s → [`synthesize`] → [`Report`]

pub mod clarifier;
pub mod prompts;
pub mod state;
pub mod supervisor;
pub mod synthesizer;
pub mod worker;

pub use clarifier::{ClarifierDecision, ClarifyOutcome, ScopeClarifier};
pub use prompts::ResearchPrompts;
pub use state::{
    Citation, CompletionReason, EvidenceSection, FailureDescriptor, Finding, FindingStatus,
    IncompleteCause, Report, ReportCitation, ResearchBrief, SessionBudget, SessionPhase,
    SessionState, SubTopicAssignment, SubTopicId,
};
pub use supervisor::{PlannedSubTopic, Supervisor, SupervisorDecision, SupervisorPhase};
pub use synthesizer::{synthesize, PARTIAL_NOTICE};
pub use worker::{CitedSource, CompressedResearch, ResearchWorker, RoundBudget, WorkerOutcome};
