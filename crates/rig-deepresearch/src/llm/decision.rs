//! Structured decisions
//!
//! Every decision point in the pipeline owns a tagged-variant type. The
//! backend is offered exactly one tool whose schema describes that type; the
//! decision is read back from the tool call (or from a JSON object in the
//! message body when the backend answers in text) and validated by
//! deserializing into the type. Nothing untyped leaves this module.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{LLMConfig, LLMProvider, TokenUsage};
use crate::error::DecisionError;
use crate::gateway::ToolDefinition;
use crate::state::Message;

/// A schema-validated decision produced by the backend.
pub trait Decision: DeserializeOwned + Send {
    /// Name of the decision tool offered to the backend.
    const NAME: &'static str;

    /// What the backend is being asked to decide.
    fn description() -> &'static str;

    /// JSON schema of the decision arguments.
    fn schema() -> Value;

    fn tool_definition() -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: Self::description().to_string(),
            parameters: Self::schema(),
        }
    }
}

/// A validated decision plus the tokens it cost.
#[derive(Debug, Clone)]
pub struct Decided<D> {
    pub decision: D,
    pub usage: TokenUsage,
}

/// Ask the backend for a decision of type `D`.
///
/// Fails with [`DecisionError`] when the backend errors or when its answer
/// does not validate; callers decide how to degrade.
pub async fn decide<D: Decision>(
    llm: &dyn LLMProvider,
    messages: &[Message],
    config: Option<&LLMConfig>,
) -> Result<Decided<D>, DecisionError> {
    let tools = [D::tool_definition()];
    let response = llm.complete(messages, &tools, config).await?;
    let usage = response.usage_or_estimate(messages);

    let decision = parse_decision::<D>(&response.message)?;
    debug!(decision = D::NAME, tokens = usage.total_tokens, "Decision parsed");

    Ok(Decided { decision, usage })
}

/// Extract and validate a decision from an assistant message.
pub fn parse_decision<D: Decision>(message: &Message) -> Result<D, DecisionError> {
    if let Some(call) = message.tool_calls().iter().find(|c| c.name == D::NAME) {
        return validate::<D>(call.arguments.clone());
    }

    match extract_json_object(&message.content) {
        Some(value) => {
            // Some backends echo the tool envelope instead of the arguments.
            let value = match value.get("arguments") {
                Some(args) if value.get("name").and_then(Value::as_str) == Some(D::NAME) => {
                    args.clone()
                }
                _ => value,
            };
            validate::<D>(value)
        }
        None => Err(DecisionError::NoDecision { decision: D::NAME }),
    }
}

fn validate<D: Decision>(value: Value) -> Result<D, DecisionError> {
    serde_json::from_value(value).map_err(|e| DecisionError::Malformed {
        decision: D::NAME,
        reason: e.to_string(),
    })
}

/// Find the outermost JSON object in free text, tolerating code fences.
pub(crate) fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
