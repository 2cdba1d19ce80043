use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Definition of a tool that can be called by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool.
    pub name: String,

    /// A description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input.
    pub input_schema: serde_json::Value,
}

/// Trait for callable tools.
///
/// Tools accept JSON input and return string output. A returned error is
/// not fatal to a run: callers turn it into an error tool result.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Return the tool's definition including its JSON Schema.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn call(&self, input: serde_json::Value) -> Result<String>;
}

/// Resolved outcome of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { output: String },
    Error { message: String },
}

/// A tool outcome bound to the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, tool_name: impl Into<String>, output: String) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Success { output },
        }
    }

    pub fn error(call_id: impl Into<String>, tool_name: impl Into<String>, message: String) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Error { message },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error { .. })
    }

    /// Convert into the role="tool" message the model sees next turn.
    ///
    /// Errors are rendered as `{"is_error": true, "message": ...}` so the
    /// model can tell a failure from a legitimate result.
    pub fn into_message(self) -> Message {
        match self.outcome {
            ToolOutcome::Success { output } => Message::tool(output, self.call_id),
            ToolOutcome::Error { message } => {
                let payload = serde_json::json!({
                    "is_error": true,
                    "tool": self.tool_name,
                    "message": message,
                });
                Message::tool_error(payload.to_string(), self.call_id)
            }
        }
    }
}
