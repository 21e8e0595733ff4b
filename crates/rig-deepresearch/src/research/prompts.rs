//! Research prompt templates
//!
//! Prompts for each decision point of the pipeline:
//! - Clarifier: decide whether the request is researchable as stated
//! - Supervisor: split the brief into sub-topics or declare completion
//! - Researcher: iterative tool use for one sub-topic
//! - Compressor: turn a worker's transcript into a cited summary

use chrono::Utc;

use super::state::{Finding, ResearchBrief, SubTopicAssignment};

/// Prompt templates for the research pipeline
pub struct ResearchPrompts;

impl ResearchPrompts {
    fn current_date() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Scope clarifier prompt.
    ///
    /// `can_ask` is false once the clarification cap is reached.
    pub fn clarifier(decision_tool: &str, can_ask: bool) -> String {
        let asking = if can_ask {
            "If the request is ambiguous in a way that would change what is researched (unclear acronyms, missing scope, missing time range, unstated comparison targets), ask ONE concise question with `needs_clarification`. Do not ask for information the user has already given."
        } else {
            "You may NOT ask further questions. Produce a brief with `brief_ready` from the information available, stating reasonable assumptions in the success criteria."
        };

        format!(
            r#"# Research Scope

For context, today's date is {date}.

You decide whether a research request can be researched as stated.

## Decision

Answer by calling `{tool}` exactly once.

- {asking}
- Otherwise answer with `brief_ready`:
  - `clarified_questions`: the specific questions the research must answer, most important first
  - `success_criteria`: how to tell the research is complete

Keep the user's wording where it is already precise. Never drop part of the request.
"#,
            date = Self::current_date(),
            tool = decision_tool,
            asking = asking,
        )
    }

    /// Supervisor planning prompt.
    pub fn supervisor(
        decision_tool: &str,
        brief: &ResearchBrief,
        round: u32,
        max_rounds: u32,
        max_subtopics: usize,
    ) -> String {
        let questions = brief
            .clarified_questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}", i + 1, q))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"# Research Supervisor

For context, today's date is {date}.

You coordinate research by delegating sub-topics to independent researchers. Each researcher only sees the description you write, so every sub-topic must be self-contained.

## Brief

**Request:** {request}

**Questions:**
{questions}

**Success criteria:** {criteria}

## Decision

This is round {round} of at most {max_rounds}. Answer by calling `{tool}` exactly once:

- `delegate` with 1 to {max_subtopics} sub-topics, each with a `description` and a `rationale`
- `research_complete` with a `reason` when the findings so far satisfy the success criteria

## Guidelines

| Request type | Strategy |
|--------------|----------|
| Overview | One comprehensive sub-topic |
| Comparison (A vs B) | One sub-topic per entity |
| Follow-up round | Only the gaps the findings leave open |

- Never repeat a sub-topic that already has a complete finding
- Prefer fewer, focused sub-topics over many narrow ones
"#,
            date = Self::current_date(),
            request = brief.original_request,
            questions = questions,
            criteria = brief.success_criteria,
            round = round,
            max_rounds = max_rounds,
            tool = decision_tool,
            max_subtopics = max_subtopics,
        )
    }

    /// Findings so far, as shown to the supervisor.
    pub fn findings_digest(findings: &[Finding]) -> String {
        if findings.is_empty() {
            return "No findings yet. Plan the first round of research.".to_string();
        }

        let mut out = String::from("## Findings so far\n");
        for finding in findings {
            let status = match finding.incomplete_cause() {
                Some(cause) => format!(" (incomplete: {})", cause),
                None => String::new(),
            };
            out.push_str(&format!(
                "\n### [{}] {}{}\n{}\nSources: {}\n",
                finding.subtopic_id,
                finding.topic,
                status,
                finding.summary,
                finding.citations.len()
            ));
        }
        out
    }

    /// Researcher prompt for one sub-topic.
    pub fn researcher(assignment: &SubTopicAssignment, max_tool_calls: usize) -> String {
        format!(
            r#"# Researcher

For context, today's date is {date}.

You research ONE sub-topic using the tools available to you.

## Sub-topic

{description}

Why it matters: {rationale}

## Research Strategy

1. Start with broad searches, then narrow down
2. After each result, decide whether you already have enough to answer
3. Use `think` to reflect on gaps before searching again
4. Stop calling tools as soon as you can answer; reply with a short plain-text note

## Hard Limits

- At most {max_tool_calls} tool calls in total
- Stop immediately when 3+ relevant sources agree
- Stop if two searches in a row return the same information
"#,
            date = Self::current_date(),
            description = assignment.description,
            rationale = assignment.rationale,
            max_tool_calls = max_tool_calls,
        )
    }

    /// Compression prompt: transcript in, cited summary out.
    pub fn compressor(decision_tool: &str, topic: &str) -> String {
        format!(
            r#"# Research Compression

For context, today's date is {date}.

Summarize the research gathered above on: {topic}

Answer by calling `{tool}` exactly once with:
- `summary`: the facts found, stated plainly, with figures and dates where available
- `citations`: for each source you relied on, its `source_id` exactly as listed under "Sources:" in the tool results, plus a `locator` if one was given

## Rules

- Every claim in the summary must come from a tool result above
- Omit any claim you cannot trace to a listed source
- Never invent a source_id
"#,
            date = Self::current_date(),
            topic = topic,
            tool = decision_tool,
        )
    }
}
