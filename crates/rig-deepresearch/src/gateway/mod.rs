//! Tool Gateway
//!
//! Uniform `invoke(tool_name, arguments) -> ToolResult` contract over
//! heterogeneous providers. The gateway routes by capability name, enforces
//! the per-call timeout, retries once on `RateLimited`, and never returns a
//! raw provider error: failures come back inside the [`ToolResult`].
//!
//! ```text
//! Worker ──invoke──▶ ToolGateway ──▶ ToolProvider (web_search)
//!                        │      └──▶ ToolProvider (read_document)
//!                        │      └──▶ ToolProvider (statistical_data)
//!                   timeout/retry
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ToolError;
use crate::state::ToolCall;

/// 도구 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Where a piece of evidence came from.
///
/// `source_id` is the identity used for citation deduplication (a URL, a
/// document path, a dataset key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default)]
    pub snippet: String,
}

impl SourceRef {
    pub fn new(source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            locator: None,
            snippet: String::new(),
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// Tool payload: free text or a structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ToolContent {
    Text(String),
    Structured(Value),
}

impl ToolContent {
    pub fn render(&self) -> String {
        match self {
            ToolContent::Text(text) => text.clone(),
            ToolContent::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// What a provider hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: ToolContent,
    pub sources: Vec<SourceRef>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: ToolContent::Text(text.into()),
            sources: Vec::new(),
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            content: ToolContent::Structured(value),
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceRef>) -> Self {
        self.sources = sources;
        self
    }
}

/// Immutable outcome of one gateway call.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub content: ToolContent,
    pub sources: Vec<SourceRef>,
    pub error: Option<ToolError>,
}

impl ToolResult {
    fn success(call_id: &str, tool_name: &str, output: ToolOutput) -> Self {
        Self {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            content: output.content,
            sources: output.sources,
            error: None,
        }
    }

    fn failure(call_id: &str, tool_name: &str, error: ToolError) -> Self {
        Self {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            content: ToolContent::Text(String::new()),
            sources: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Text fed back into the worker's context.
    ///
    /// Sources are listed with their ids so the backend can cite them.
    pub fn render_for_context(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error ({}): {}", error.kind(), error);
        }

        let mut out = self.content.render();
        if !self.sources.is_empty() {
            out.push_str("\n\nSources:\n");
            for source in &self.sources {
                match &source.locator {
                    Some(locator) => out.push_str(&format!(
                        "- [{}] {} ({})\n",
                        source.source_id, source.title, locator
                    )),
                    None => out.push_str(&format!("- [{}] {}\n", source.source_id, source.title)),
                }
            }
        }
        out
    }
}

/// One external capability behind the gateway.
///
/// The definition's `name` is the capability name the gateway routes on.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError>;
}

/// Dynamic provider handle.
pub type DynToolProvider = Arc<dyn ToolProvider>;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait before the single rate-limit retry.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Routes tool calls to registered providers.
#[derive(Clone)]
pub struct ToolGateway {
    providers: HashMap<String, DynToolProvider>,
    /// Registration order, so the catalogue shown to the backend is stable.
    order: Vec<String>,
    call_timeout: Duration,
    rate_limit_backoff: Duration,
}

impl Default for ToolGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolGateway {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Register a provider under its definition name, replacing any previous
    /// provider for the same capability.
    pub fn with_provider(mut self, provider: DynToolProvider) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: DynToolProvider) {
        let name = provider.definition().name;
        if self.providers.insert(name.clone(), provider).is_some() {
            warn!(tool = %name, "Replacing previously registered tool provider");
        } else {
            self.order.push(name);
        }
    }

    pub fn capabilities(&self) -> &[String] {
        &self.order
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Definitions of every registered capability, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.providers.get(name))
            .map(|p| p.definition())
            .collect()
    }

    /// Invoke a capability with a freshly generated call id.
    pub async fn invoke(&self, tool_name: &str, arguments: Value) -> ToolResult {
        let call_id = format!("call_{}", Uuid::new_v4().simple());
        self.dispatch(&call_id, tool_name, arguments).await
    }

    /// Invoke the capability named by a backend-issued tool call.
    pub async fn invoke_call(&self, call: &ToolCall) -> ToolResult {
        self.dispatch(&call.id, &call.name, call.arguments.clone()).await
    }

    async fn dispatch(&self, call_id: &str, tool_name: &str, arguments: Value) -> ToolResult {
        let Some(provider) = self.providers.get(tool_name) else {
            warn!(tool = %tool_name, call_id, "Unknown tool requested");
            return ToolResult::failure(
                call_id,
                tool_name,
                ToolError::Unavailable(format!("no provider registered for '{}'", tool_name)),
            );
        };

        let started = Instant::now();
        let mut outcome = self.attempt(provider.as_ref(), arguments.clone()).await;

        if let Err(ref error) = outcome {
            if error.is_rate_limited() {
                warn!(
                    tool = %tool_name,
                    call_id,
                    backoff_ms = self.rate_limit_backoff.as_millis() as u64,
                    "Rate limited, retrying once"
                );
                tokio::time::sleep(self.rate_limit_backoff).await;
                outcome = self.attempt(provider.as_ref(), arguments).await;
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(output) => {
                debug!(tool = %tool_name, call_id, elapsed_ms, sources = output.sources.len(), "Tool call succeeded");
                ToolResult::success(call_id, tool_name, output)
            }
            Err(error) => {
                warn!(tool = %tool_name, call_id, elapsed_ms, error = %error, "Tool call failed");
                ToolResult::failure(call_id, tool_name, error)
            }
        }
    }

    async fn attempt(&self, provider: &dyn ToolProvider, arguments: Value) -> Result<ToolOutput, ToolError> {
        match tokio::time::timeout(self.call_timeout, provider.invoke(arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(self.call_timeout.as_millis() as u64)),
        }
    }
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("capabilities", &self.order)
            .field("call_timeout", &self.call_timeout)
            .field("rate_limit_backoff", &self.rate_limit_backoff)
            .finish()
    }
}
