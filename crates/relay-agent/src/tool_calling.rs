//! Turning a streamed model reply into either a text stream or a batch of
//! tool calls, and executing those calls against a run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use relay_core::error::{ModelError, RelayError, Result, ToolError};
use relay_core::message::{Message, ToolCall};
use relay_core::model::{CallOptions, ChatEventStream, ChatModel, ChatStreamEvent, TextChunkStream};
use relay_core::tool::{Tool, ToolDefinition, ToolResult};
use relay_graph::context::RunContext;
use relay_graph::notification::{Notification, Progress};

/// Reassembles streamed tool-call fragments into complete calls.
///
/// Fragments are keyed by call id; calls come out in the order their
/// `ToolCallStart` arrived.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    order: Vec<String>,
    partial: HashMap<String, PartialCall>,
}

#[derive(Debug)]
struct PartialCall {
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stream event. Text, usage and completion events are ignored.
    pub fn push(&mut self, event: &ChatStreamEvent) -> Result<()> {
        match event {
            ChatStreamEvent::ToolCallStart { id, name } => {
                if !self.partial.contains_key(id) {
                    self.order.push(id.clone());
                }
                self.partial.insert(
                    id.clone(),
                    PartialCall {
                        name: name.clone(),
                        arguments: String::new(),
                    },
                );
            }
            ChatStreamEvent::ToolCallDelta { id, arguments } => {
                let call = self.partial.get_mut(id).ok_or_else(|| {
                    ModelError::InvalidResponse(format!("arguments for unknown tool call '{id}'"))
                })?;
                call.arguments.push_str(arguments);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Parse the accumulated arguments. Empty arguments become `{}`.
    pub fn finish(mut self) -> Result<Vec<ToolCall>> {
        self.order
            .into_iter()
            .map(|id| -> Result<ToolCall> {
                let call = self
                    .partial
                    .remove(&id)
                    .ok_or_else(|| ModelError::InvalidResponse(format!("tool call '{id}' vanished")))?;
                let input = if call.arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&call.arguments).map_err(|e| {
                        ModelError::InvalidResponse(format!("arguments of tool call '{id}' are not JSON: {e}"))
                    })?
                };
                Ok(ToolCall {
                    id,
                    name: call.name,
                    input,
                })
            })
            .collect()
    }
}

/// What a model turn produced: tool calls or a text stream, never both.
pub struct ToolCallResponse {
    pub calls: Vec<ToolCall>,
    /// The assistant message carrying `calls`, ready to append to memory.
    pub tool_call_message: Option<Message>,
    pub text_stream: Option<TextChunkStream>,
}

impl ToolCallResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Distinct tool names in call order.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for call in &self.calls {
            if !names.contains(&call.name.as_str()) {
                names.push(&call.name);
            }
        }
        names
    }
}

impl fmt::Debug for ToolCallResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCallResponse")
            .field("calls", &self.calls)
            .field("tool_call_message", &self.tool_call_message)
            .field("text_stream", &self.text_stream.is_some())
            .finish()
    }
}

/// Stream a chat completion with `tools` attached and decide from the first
/// meaningful event whether the model is answering or calling tools.
///
/// Text is handed back as a lazy single-pass stream; tool calls are buffered
/// until the provider signals the end of the turn.
pub async fn chat_with_tools(
    llm: &dyn ChatModel,
    tools: &[Arc<dyn Tool>],
    messages: &[Message],
) -> Result<ToolCallResponse> {
    let options = CallOptions {
        tools: tools.iter().map(|t| t.definition()).collect::<Vec<ToolDefinition>>(),
        ..Default::default()
    };
    let mut stream = llm.stream(messages, &options).await?;

    while let Some(event) = stream.next().await {
        match event? {
            ChatStreamEvent::Token(token) if token.is_empty() => continue,
            ChatStreamEvent::Usage(_) => continue,
            ChatStreamEvent::Token(token) => {
                return Ok(ToolCallResponse {
                    calls: Vec::new(),
                    tool_call_message: None,
                    text_stream: Some(Box::pin(text_deltas(token, stream))),
                });
            }
            ChatStreamEvent::Done => break,
            first @ (ChatStreamEvent::ToolCallStart { .. } | ChatStreamEvent::ToolCallDelta { .. }) => {
                return collect_tool_calls(first, stream).await;
            }
        }
    }

    Ok(ToolCallResponse {
        calls: Vec::new(),
        tool_call_message: None,
        text_stream: Some(Box::pin(futures::stream::empty())),
    })
}

fn text_deltas(first: String, mut rest: ChatEventStream) -> impl Stream<Item = Result<String>> + Send + 'static {
    try_stream! {
        yield first;
        while let Some(event) = rest.next().await {
            match event? {
                ChatStreamEvent::Token(token) if !token.is_empty() => {
                    yield token;
                }
                ChatStreamEvent::Done => break,
                _ => {}
            }
        }
    }
}

async fn collect_tool_calls(first: ChatStreamEvent, mut stream: ChatEventStream) -> Result<ToolCallResponse> {
    let mut acc = ToolCallAccumulator::new();
    let mut content = String::new();
    acc.push(&first)?;
    while let Some(event) = stream.next().await {
        let event = event?;
        match &event {
            ChatStreamEvent::Done => break,
            ChatStreamEvent::Token(token) => content.push_str(token),
            _ => acc.push(&event)?,
        }
    }
    let calls = acc.finish()?;
    tracing::debug!(calls = calls.len(), "model requested tool calls");
    Ok(ToolCallResponse {
        tool_call_message: Some(Message::assistant_with_tool_calls(content, calls.clone())),
        calls,
        text_stream: None,
    })
}

/// Assistant message recorded instead of executing a turn that mixes tools.
///
/// Returns `None` when every call names the same tool.
pub fn single_tool_violation(calls: &[ToolCall]) -> Option<Message> {
    let mut names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    if names.len() <= 1 {
        return None;
    }
    tracing::warn!(tools = ?names, "model mixed several tools in one turn");
    Some(Message::assistant(format!(
        "I called several different tools at once ({}). I can only use one kind of tool per turn, \
         so none of them ran. I will pick a single tool and try again.",
        names.join(", ")
    )))
}

/// Execute `calls` one after another and capture every outcome.
///
/// A failing or unknown tool becomes an error result. Each execution races
/// the run's cancellation token; cancellation aborts with
/// [`RelayError::Cancelled`]. Results keep the order of `calls`.
pub async fn call_tools<S>(
    ctx: &RunContext<S>,
    tools: &[Arc<dyn Tool>],
    calls: &[ToolCall],
    agent: &str,
) -> Result<Vec<ToolResult>> {
    let tools_map: HashMap<String, &Arc<dyn Tool>> =
        tools.iter().map(|t| (t.definition().name, t)).collect();
    let progress_id = Uuid::new_v4().to_string();
    let total = calls.len();

    let mut results = Vec::with_capacity(total);
    for (current, call) in calls.iter().enumerate() {
        let text = format!("Calling tool {} with input {}", call.name, call.input);
        if total == 1 {
            ctx.send_event(Notification::agent_run(agent, text));
        } else {
            ctx.send_event(Notification::agent_progress(
                agent,
                text,
                Progress {
                    id: progress_id.clone(),
                    total,
                    current,
                },
            ));
        }

        let outcome = match tools_map.get(&call.name) {
            Some(tool) => {
                tokio::select! {
                    biased;
                    _ = ctx.cancellation().cancelled() => return Err(RelayError::Cancelled),
                    result = tool.call(call.input.clone()) => result,
                }
            }
            None => Err(ToolError::NotFound(call.name.clone()).into()),
        };
        let result = match outcome {
            Ok(output) => ToolResult::success(&call.id, &call.name, output),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                ToolResult::error(&call.id, &call.name, e.to_string())
            }
        };
        results.push(result);
    }
    Ok(results)
}

/// Append a tool turn to memory: the assistant call message, then one
/// tool message per result.
pub fn record_tool_turn<S>(ctx: &RunContext<S>, tool_call_message: Option<Message>, results: Vec<ToolResult>) {
    if let Some(message) = tool_call_message {
        ctx.put(message);
    }
    ctx.put_all(results.into_iter().map(ToolResult::into_message));
}

/// Plain streamed answer from `llm`, with no tools offered.
pub async fn stream_text(llm: &dyn ChatModel, messages: &[Message]) -> Result<TextChunkStream> {
    let response = chat_with_tools(llm, &[], messages).await?;
    response.text_stream.ok_or_else(|| {
        ModelError::InvalidResponse("model requested tools although none were offered".into()).into()
    })
}
