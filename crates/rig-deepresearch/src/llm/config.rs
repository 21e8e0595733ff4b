//! Per-call backend settings and token usage

use serde::{Deserialize, Serialize};

use crate::state::Message;

/// Characters per token used when a provider does not report usage.
const CHARS_PER_TOKEN: usize = 4;

/// Tokens consumed by one backend call.
///
/// Feeds the cost ledger and the session and worker token budgets.
///
/// ```
/// use rig_deepresearch::llm::TokenUsage;
///
/// let usage = TokenUsage::new(100, 50);
/// assert_eq!(usage.total_tokens, 150);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
        }
    }

    /// Estimate for backends that report nothing: four characters per
    /// token over the whole transcript, at least one token per side.
    pub fn estimate(messages: &[Message], output: &str) -> Self {
        let prompt_chars: usize = messages
            .iter()
            .map(|m| m.content.len() + m.tool_calls().iter().map(|c| c.arguments.to_string().len()).sum::<usize>())
            .sum();
        Self::new(chars_to_tokens(prompt_chars), chars_to_tokens(output.len()))
    }
}

fn chars_to_tokens(chars: usize) -> u64 {
    (chars / CHARS_PER_TOKEN).max(1) as u64
}

/// Overrides a component passes with each backend call.
///
/// Built from `ResearchConfig::model`. The model id is also the price key
/// in the cost ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
}

impl LLMConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    /// Config for an optional model override; blank names mean "no override".
    pub fn for_model(model: Option<&str>) -> Option<Self> {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ToolCall;
    use serde_json::json;

    #[test]
    fn test_estimate_from_characters() {
        let messages = vec![Message::user(&"a".repeat(400)), Message::system(&"b".repeat(40))];
        let usage = TokenUsage::estimate(&messages, &"c".repeat(80));

        assert_eq!(usage.input_tokens, 110);
        assert_eq!(usage.output_tokens, 20);
        assert_eq!(usage.total_tokens, 130);
    }

    #[test]
    fn test_estimate_counts_tool_call_arguments() {
        let call = ToolCall::new("c1", "web_search", json!({"query": "x".repeat(38)}));
        let messages = vec![Message::assistant_with_tool_calls("", vec![call])];
        let usage = TokenUsage::estimate(&messages, "");

        // {"query":"xxx..."} is 50 characters
        assert_eq!(usage.input_tokens, 12);
    }

    #[test]
    fn test_estimate_never_zero() {
        let usage = TokenUsage::estimate(&[], "");
        assert_eq!(usage, TokenUsage::new(1, 1));
    }

    #[test]
    fn test_for_model_ignores_blank() {
        assert_eq!(LLMConfig::for_model(Some(" gpt-4o ")), Some(LLMConfig::new("gpt-4o")));
        assert_eq!(LLMConfig::for_model(Some("  ")), None);
        assert_eq!(LLMConfig::for_model(None), None);
    }
}
