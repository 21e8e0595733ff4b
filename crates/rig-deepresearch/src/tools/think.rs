//! Think Tool - Explicit reflection for research workers
//!
//! Lets a worker pause between searches and record its reasoning. It has no
//! side effects and produces no sources, so a reflection can never be cited.
//! The tool result is a one-line acknowledgement to keep worker context small.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ToolError;
use crate::gateway::{ToolDefinition, ToolOutput, ToolProvider};

pub struct ThinkTool;

#[derive(Debug, Deserialize)]
struct ThinkArgs {
    reflection: String,
}

#[async_trait]
impl ToolProvider for ThinkTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "think".to_string(),
            description: "Record a reflection on what you have found so far, what is missing, and whether to search again or stop.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "reflection": {
                        "type": "string",
                        "description": "Your analysis of the findings so far and the next step",
                        "minLength": 1
                    }
                },
                "required": ["reflection"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: ThinkArgs = serde_json::from_value(arguments)?;
        if args.reflection.trim().is_empty() {
            return Err(ToolError::InvalidArguments("reflection must not be empty".to_string()));
        }

        debug!(reflection_len = args.reflection.len(), "Think tool executed");

        Ok(ToolOutput::text(format!(
            "[Reflection recorded: {} chars]",
            args.reflection.len()
        )))
    }
}
