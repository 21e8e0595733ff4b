//! Any Rig agent as a research decision backend
//!
//! Rig agents fix their tools at build time and run their own tool loop,
//! while the research pipeline offers tools per call and runs the loop
//! itself. `RigAgentAdapter` bridges the two: the transcript and the
//! offered tool schemas are rendered into one prompt, and a JSON tool-call
//! answer is read back into `ToolCall`s.
//!
//! ```rust,ignore
//! use rig::providers::ollama::Client;
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig_deepresearch::compat::RigAgentAdapter;
//!
//! let agent = Client::from_env().agent("llama3.2").build();
//! let llm = RigAgentAdapter::with_names(agent, "ollama", "llama3.2");
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::LLMError;
use crate::gateway::ToolDefinition;
use crate::llm::decision::extract_json_object;
use crate::llm::{LLMConfig, LLMProvider, LLMResponse};
use crate::state::{Message, Role, ToolCall};

pub struct RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    provider_name: String,
    model_name: String,
}

impl<M> RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>) -> Self {
        Self::with_names(agent, "rig", "rig-agent")
    }

    /// `model_name` is what the cost ledger prices calls by.
    pub fn with_names(
        agent: Agent<M>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl<M> LLMProvider for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        _config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, LLMError> {
        let prompt = render_prompt(messages, tools);
        debug!(
            provider = %self.provider_name,
            tools = tools.len(),
            prompt_chars = prompt.len(),
            "Prompting rig agent"
        );

        let reply = self
            .agent
            .prompt(prompt.as_str())
            .await
            .map_err(|e| classify_error(&e.to_string()))?;

        Ok(LLMResponse::new(read_reply(&reply)))
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.model_name
    }
}

impl<M> std::fmt::Debug for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigAgentAdapter")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish()
    }
}

fn classify_error(text: &str) -> LLMError {
    let lower = text.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") {
        LLMError::RateLimited(text.to_string())
    } else {
        LLMError::Request(text.to_string())
    }
}

/// Tool catalogue, answer format, then the transcript.
fn render_prompt(messages: &[Message], tools: &[ToolDefinition]) -> String {
    let mut sections = Vec::with_capacity(messages.len() + 1);
    if !tools.is_empty() {
        sections.push(render_tools(tools));
    }

    for message in messages {
        let body = match message.role {
            Role::System => format!("<instructions>\n{}\n</instructions>", message.content),
            Role::User => format!("<user>\n{}\n</user>", message.content),
            Role::Assistant if message.has_tool_calls() => {
                let calls: Vec<Value> = message
                    .tool_calls()
                    .iter()
                    .map(|c| json!({"name": c.name, "arguments": c.arguments}))
                    .collect();
                format!("<assistant>\n{}\n</assistant>", json!({ "tool_calls": calls }))
            }
            Role::Assistant => format!("<assistant>\n{}\n</assistant>", message.content),
            Role::Tool => format!(
                "<tool_result id=\"{}\">\n{}\n</tool_result>",
                message.tool_call_id.as_deref().unwrap_or("-"),
                message.content
            ),
        };
        sections.push(body);
    }

    sections.join("\n\n")
}

fn render_tools(tools: &[ToolDefinition]) -> String {
    let catalogue: Vec<String> = tools
        .iter()
        .map(|t| {
            json!({"name": t.name, "description": t.description, "parameters": t.parameters}).to_string()
        })
        .collect();

    // A single offered tool is a decision point: text answers are useless there.
    let instruction = match tools {
        [only] => format!(
            "Answer ONLY by calling `{}` with arguments that match its parameters.",
            only.name
        ),
        _ => "Call tools when you need more information; otherwise answer in plain text.".to_string(),
    };

    format!(
        "<tools>\n{}\n</tools>\n{}\nTool calls are a single JSON object:\n\
         {{\"tool_calls\": [{{\"name\": \"<tool>\", \"arguments\": {{...}}}}]}}",
        catalogue.join("\n"),
        instruction
    )
}

#[derive(Deserialize)]
struct CallJson {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplyJson {
    Batch { tool_calls: Vec<CallJson> },
    Single(CallJson),
}

/// Turn the agent's text into a message, lifting JSON tool calls out of it.
///
/// Accepts `{"tool_calls": [...]}` or a bare `{"name", "arguments"}`
/// object, fenced or not. Anything else stays a text answer.
fn read_reply(reply: &str) -> Message {
    let calls = match extract_json_object(reply).and_then(|v| serde_json::from_value(v).ok()) {
        Some(ReplyJson::Batch { tool_calls }) => tool_calls,
        Some(ReplyJson::Single(call)) => vec![call],
        None => Vec::new(),
    };

    if calls.is_empty() {
        return Message::assistant(reply);
    }

    let calls = calls
        .into_iter()
        .enumerate()
        .map(|(i, c)| ToolCall::new(c.id.unwrap_or_else(|| format!("call_{}", i + 1)), c.name, c.arguments))
        .collect();
    Message::assistant_with_tool_calls("", calls)
}
