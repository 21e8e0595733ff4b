//! Scripted backends shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rig_deepresearch::research::{ClarifierDecision, CompressedResearch, SupervisorDecision};
use rig_deepresearch::{
    Decision, LLMConfig, LLMError, LLMProvider, LLMResponse, Message, Role, SourceRef, ToolCall,
    ToolDefinition, ToolError, ToolOutput, ToolProvider,
};
use serde_json::{json, Value};

/// Decision backend that answers each decision point from its own script.
///
/// Workers search once with their sub-topic as the query and then stop;
/// compression cites every source id listed in the tool results.
pub struct ScriptedResearchLLM {
    clarifications: Mutex<Vec<Value>>,
    plans: Mutex<Vec<Value>>,
    last_plan: Value,
    pub plan_calls: AtomicUsize,
    pub clarify_calls: AtomicUsize,
}

impl ScriptedResearchLLM {
    pub fn new(clarifications: Vec<Value>, plans: Vec<Value>) -> Arc<Self> {
        let last_plan = plans.last().cloned().unwrap_or_else(complete);
        Arc::new(Self {
            clarifications: Mutex::new(clarifications.into_iter().rev().collect()),
            plans: Mutex::new(plans.into_iter().rev().collect()),
            last_plan,
            plan_calls: AtomicUsize::new(0),
            clarify_calls: AtomicUsize::new(0),
        })
    }

    fn decision(name: &str, args: Value) -> LLMResponse {
        LLMResponse::new(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("decision", name, args)],
        ))
    }
}

#[async_trait]
impl LLMProvider for ScriptedResearchLLM {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        _config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, LLMError> {
        let offers = |name: &str| tools.iter().any(|t| t.name == name);

        if offers(ClarifierDecision::NAME) {
            self.clarify_calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .clarifications
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| brief_ready(&["the request"], "answered"));
            return Ok(Self::decision(ClarifierDecision::NAME, next));
        }

        if offers(SupervisorDecision::NAME) {
            self.plan_calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .plans
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| self.last_plan.clone());
            return Ok(Self::decision(SupervisorDecision::NAME, next));
        }

        let topic = messages.get(1).map(|m| m.content.clone()).unwrap_or_default();

        if offers(CompressedResearch::NAME) {
            let citations: Vec<Value> = cited_ids(messages)
                .into_iter()
                .map(|id| json!({"source_id": id}))
                .collect();
            return Ok(Self::decision(
                CompressedResearch::NAME,
                json!({"summary": format!("Findings on {}. Figures as reported.", topic), "citations": citations}),
            ));
        }

        if messages.last().map(|m| m.role) == Some(Role::Tool) {
            return Ok(LLMResponse::new(Message::assistant("I have enough to answer.")));
        }

        Ok(LLMResponse::new(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("search-1", "web_search", json!({"query": topic}))],
        )))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

/// Source ids listed as `- [id] title` in tool results.
fn cited_ids(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .flat_map(|m| m.content.lines())
        .filter_map(|line| line.strip_prefix("- ["))
        .filter_map(|rest| rest.split(']').next())
        .map(str::to_string)
        .collect()
}

/// Web search double: one source per query, optional failures and latency.
pub struct MockSearch {
    delay: Duration,
    failing: Vec<(String, ToolError)>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(10),
            failing: Vec::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queries containing `needle` fail with `error`.
    pub fn failing_on(mut self, needle: &str, error: ToolError) -> Self {
        self.failing.push((needle.to_string(), error));
        self
    }
}

#[async_trait]
impl ToolProvider for MockSearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("query is required".to_string()))?;

        if let Some((_, error)) = self.failing.iter().find(|(needle, _)| query.contains(needle.as_str())) {
            return Err(error.clone());
        }

        let slug: String = query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let url = format!("https://stats.example/{}", slug);
        Ok(ToolOutput::text(format!("Statistics for {}", query)).with_sources(vec![SourceRef::new(
            url,
            format!("Statistics: {}", query),
        )
        .with_snippet(format!("Reported figures for {}", query))]))
    }
}

pub fn brief_ready(questions: &[&str], criteria: &str) -> Value {
    json!({
        "decision": "brief_ready",
        "clarified_questions": questions,
        "success_criteria": criteria
    })
}

pub fn needs_clarification(question: &str) -> Value {
    json!({"decision": "needs_clarification", "question": question})
}

pub fn delegate(topics: &[&str]) -> Value {
    let subtopics: Vec<Value> = topics
        .iter()
        .map(|t| json!({"description": t, "rationale": "required by the brief"}))
        .collect();
    json!({"decision": "delegate", "subtopics": subtopics})
}

pub fn complete() -> Value {
    json!({"decision": "research_complete", "reason": "all questions answered"})
}
