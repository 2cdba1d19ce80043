use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, UsageMetadata};

fn default_true() -> bool {
    true
}

/// Desired response format for structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text (default, equivalent to omitting the field).
    Text,
    /// Force JSON output conforming to a schema.
    JsonSchema {
        name: String,
        schema: serde_json::Value,
        #[serde(default = "default_true")]
        strict: bool,
    },
}

/// Options controlling a ChatModel invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallOptions {
    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Tool definitions available for the model to call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<crate::tool::ToolDefinition>,

    /// Structured output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Result of a chat model generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    /// The generated message.
    pub message: Message,

    /// Token usage metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

/// Events emitted during streaming model generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// A text token from the model.
    Token(String),
    /// Start of a tool call.
    ToolCallStart { id: String, name: String },
    /// Partial JSON arguments for an in-progress tool call.
    ToolCallDelta { id: String, arguments: String },
    /// Token usage metadata.
    Usage(UsageMetadata),
    /// The provider finished the turn.
    Done,
}

impl ChatStreamEvent {
    pub fn is_tool_call(&self) -> bool {
        matches!(
            self,
            ChatStreamEvent::ToolCallStart { .. } | ChatStreamEvent::ToolCallDelta { .. }
        )
    }
}

/// Raw event stream returned by [`ChatModel::stream`].
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

/// Single-pass stream of text deltas destined for the caller.
///
/// Dropping the stream abandons the underlying request.
pub type TextChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for chat language models.
///
/// Implementations handle API communication, request formatting,
/// and response parsing for a specific model provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete response for the given messages.
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult>;

    /// Return the model name/identifier.
    fn model_name(&self) -> &str;

    /// Stream a response chunk by chunk.
    ///
    /// Default implementation calls `generate` and replays the result as
    /// events. Tool calls are replayed before any text so that the first
    /// event carries the tool-call marker.
    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<ChatEventStream> {
        let result = self.generate(messages, options).await?;
        let mut events: Vec<Result<ChatStreamEvent>> = Vec::new();
        for tc in result.message.tool_calls() {
            events.push(Ok(ChatStreamEvent::ToolCallStart {
                id: tc.id.clone(),
                name: tc.name.clone(),
            }));
            events.push(Ok(ChatStreamEvent::ToolCallDelta {
                id: tc.id.clone(),
                arguments: serde_json::to_string(&tc.input)?,
            }));
        }
        let content = result.message.content();
        if !content.is_empty() {
            events.push(Ok(ChatStreamEvent::Token(content.to_string())));
        }
        if let Some(usage) = result.usage {
            events.push(Ok(ChatStreamEvent::Usage(usage)));
        }
        events.push(Ok(ChatStreamEvent::Done));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}
