//! rig-deepresearch: multi-phase research orchestration for Rig
//!
//! 요청을 명확히 하고, 하위 주제로 나누어 병렬로 조사한 뒤, 인용이 달린 보고서를 작성합니다.
//! - ScopeClarifier: 요청이 모호하면 질문하고, 아니면 ResearchBrief 생성
//! - Supervisor: 하위 주제 위임, 병렬 워커 실행, 완료 판단
//! - ResearchWorker: 하위 주제별 도구 사용 루프와 요약
//! - ToolGateway: 외부 도구에 대한 단일 호출 계약
//! - synthesize: 결과를 보고서로 병합
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rig::providers::ollama;
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig_deepresearch::{
//!     research_tools, NoProgress, RigAgentAdapter, ResearchConfig, ResearchEngine,
//!     ResearchOutcome, ResearchToolOptions, ToolGateway,
//! };
//!
//! let agent = ollama::Client::from_env().agent("llama3.2").build();
//! let llm = Arc::new(RigAgentAdapter::new(agent));
//!
//! let gateway = research_tools(&ResearchToolOptions::from_env())?
//!     .into_iter()
//!     .fold(ToolGateway::new(), |g, p| g.with_provider(p));
//!
//! let engine = ResearchEngine::new(llm, gateway, ResearchConfig::default())?;
//! let handle = engine.start_session("Compare GDP growth in France and Germany", vec![]).await?;
//! if let ResearchOutcome::Report(report) = engine.run_to_completion(&handle, &NoProgress).await? {
//!     println!("{}", report.to_markdown());
//! }
//! ```

pub mod compat;
pub mod config;
pub mod cost;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod research;
pub mod session;
pub mod state;
pub mod tools;

// Re-exports for convenience
pub use compat::RigAgentAdapter;
pub use config::{CompletionTieBreak, ResearchConfig, ScopeFailurePolicy};
pub use cost::{CostEntry, CostLedger, CostSummary, ModelPrice, PricingTable};
pub use error::{
    DecisionError, EmptyResearchError, LLMError, ResearchError, ScopeError, ToolError, ToolErrorKind,
};
pub use gateway::{
    DynToolProvider, SourceRef, ToolContent, ToolDefinition, ToolGateway, ToolOutput, ToolProvider,
    ToolResult,
};
pub use llm::{decide, Decided, Decision, LLMConfig, LLMProvider, LLMResponse, TokenUsage};
pub use research::{
    synthesize, Citation, CompletionReason, FailureDescriptor, Finding, FindingStatus, IncompleteCause,
    Report, ResearchBrief, SessionPhase, SessionState, SubTopicAssignment, SubTopicId,
};
pub use session::{
    NoProgress, ProgressEvent, ProgressSink, ResearchEngine, ResearchOutcome, SessionHandle, SessionId,
};
pub use state::{ConversationTurn, Message, Role, ToolCall};
pub use tools::{
    research_tools, DataCommonsProvider, DuckDuckGoSearchProvider, LocalDocumentStore,
    ResearchToolOptions, TavilySearchProvider, ThinkTool,
};
