//! The decision backend seen by the research pipeline

use async_trait::async_trait;

use super::config::{LLMConfig, TokenUsage};
use crate::error::LLMError;
use crate::gateway::ToolDefinition;
use crate::state::Message;

/// One backend answer: an assistant message, maybe with tool calls.
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub message: Message,
    /// Usage as reported by the backend; many local models report none
    pub usage: Option<TokenUsage>,
}

impl LLMResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Reported usage, or an estimate derived from the transcript.
    pub fn usage_or_estimate(&self, messages: &[Message]) -> TokenUsage {
        self.usage
            .clone()
            .unwrap_or_else(|| TokenUsage::estimate(messages, &self.message.content))
    }
}

/// Decision backend.
///
/// Opaque to the pipeline. The clarifier and supervisor offer it exactly one
/// decision tool; a worker offers it the gateway's catalogue and reads tool
/// calls back. Implementations must be shareable across concurrent workers.
///
/// ```rust,ignore
/// #[async_trait]
/// impl LLMProvider for Canned {
///     async fn complete(&self, _: &[Message], _: &[ToolDefinition], _: Option<&LLMConfig>)
///         -> Result<LLMResponse, LLMError>
///     {
///         Ok(LLMResponse::new(Message::assistant("nothing to add")))
///     }
///     fn name(&self) -> &str { "canned" }
///     fn default_model(&self) -> &str { "canned-1" }
/// }
/// ```
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Answer the transcript, optionally calling one or more of `tools`.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, LLMError>;

    fn name(&self) -> &str;

    /// Model used when a call carries no override.
    fn default_model(&self) -> &str;

    /// Model a call with `config` runs on; the cost ledger prices by it.
    fn model_for(&self, config: Option<&LLMConfig>) -> String {
        config
            .map(|c| c.model.clone())
            .unwrap_or_else(|| self.default_model().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned;

    #[async_trait]
    impl LLMProvider for Canned {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, LLMError> {
            Ok(LLMResponse::new(Message::assistant("nothing to add")))
        }

        fn name(&self) -> &str {
            "canned"
        }

        fn default_model(&self) -> &str {
            "canned-1"
        }
    }

    #[test]
    fn test_model_for_prefers_override() {
        let llm = Canned;
        assert_eq!(llm.model_for(None), "canned-1");
        assert_eq!(llm.model_for(Some(&LLMConfig::new("gpt-4o"))), "gpt-4o");
    }

    #[test]
    fn test_usage_prefers_reported() {
        let messages = vec![Message::user("question")];
        let reported = LLMResponse::new(Message::assistant("answer")).with_usage(TokenUsage::new(10, 5));
        assert_eq!(reported.usage_or_estimate(&messages), TokenUsage::new(10, 5));

        let estimated = LLMResponse::new(Message::assistant("answer"));
        assert_eq!(estimated.usage_or_estimate(&messages), TokenUsage::new(2, 1));
    }

    #[tokio::test]
    async fn test_provider_is_object_safe() {
        let llm: std::sync::Arc<dyn LLMProvider> = std::sync::Arc::new(Canned);
        let response = llm.complete(&[Message::user("hi")], &[], None).await.unwrap();
        assert_eq!(response.message.content, "nothing to add");
        assert_eq!(llm.name(), "canned");
    }
}
