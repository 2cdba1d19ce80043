use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{ModelError, Result};
use crate::message::{Message, ToolCall};
use crate::model::{CallOptions, ChatEventStream, ChatModel, ChatResult, ChatStreamEvent};

/// One scripted model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Fail(String),
}

impl ScriptedResponse {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedResponse::Text(text.into())
    }

    /// Tool calls with ids `call_0`, `call_1`, ...
    pub fn tool_calls<I, S>(calls: I) -> Self
    where
        I: IntoIterator<Item = (S, serde_json::Value)>,
        S: Into<String>,
    {
        ScriptedResponse::ToolCalls(
            calls
                .into_iter()
                .enumerate()
                .map(|(i, (name, input))| ToolCall {
                    id: format!("call_{i}"),
                    name: name.into(),
                    input,
                })
                .collect(),
        )
    }
}

/// A request observed by [`ScriptedChatModel`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub options: CallOptions,
}

/// A ChatModel that replays a script of responses and records every request.
///
/// Streaming splits text into word chunks and tool-call arguments into two
/// fragments, the way real providers deliver them. Once the script is
/// exhausted the fallback response (default `"done"`) repeats.
pub struct ScriptedChatModel {
    script: Mutex<VecDeque<ScriptedResponse>>,
    fallback: ScriptedResponse,
    chunk_delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
    call_count: AtomicUsize,
}

impl ScriptedChatModel {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: ScriptedResponse::text("done"),
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// A model that always answers with the same text.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(ScriptedResponse::text(text))
    }

    pub fn with_fallback(mut self, fallback: ScriptedResponse) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sleep before each streamed event.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_response(&self, messages: &[Message], options: &CallOptions) -> ScriptedResponse {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                options: options.clone(),
            });
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

fn split_in_two(s: &str) -> (String, String) {
    let mid = s.char_indices().nth(s.chars().count() / 2).map(|(i, _)| i).unwrap_or(s.len());
    (s[..mid].to_string(), s[mid..].to_string())
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult> {
        let message = match self.next_response(messages, options) {
            ScriptedResponse::Text(text) => Message::assistant(text),
            ScriptedResponse::ToolCalls(calls) => Message::assistant_with_tool_calls("", calls),
            ScriptedResponse::Fail(reason) => return Err(ModelError::ApiRequest(reason).into()),
        };
        Ok(ChatResult {
            message,
            usage: None,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<ChatEventStream> {
        let mut events = Vec::new();
        match self.next_response(messages, options) {
            ScriptedResponse::Text(text) => {
                for word in text.split_inclusive(' ') {
                    events.push(ChatStreamEvent::Token(word.to_string()));
                }
            }
            ScriptedResponse::ToolCalls(calls) => {
                for call in calls {
                    let (head, tail) = split_in_two(&serde_json::to_string(&call.input)?);
                    events.push(ChatStreamEvent::ToolCallStart {
                        id: call.id.clone(),
                        name: call.name,
                    });
                    events.push(ChatStreamEvent::ToolCallDelta {
                        id: call.id.clone(),
                        arguments: head,
                    });
                    events.push(ChatStreamEvent::ToolCallDelta {
                        id: call.id,
                        arguments: tail,
                    });
                }
            }
            ScriptedResponse::Fail(reason) => return Err(ModelError::ApiRequest(reason).into()),
        }
        events.push(ChatStreamEvent::Done);

        let delay = self.chunk_delay;
        let stream = futures::stream::iter(events).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(event)
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn drain(mut stream: ChatEventStream) -> Vec<ChatStreamEvent> {
        let mut out = Vec::new();
        while let Some(event) = stream.next().await {
            out.push(event.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn replays_script_then_fallback() {
        let model = ScriptedChatModel::new(vec![ScriptedResponse::text("first")]);
        let opts = CallOptions::default();
        let r1 = model.generate(&[Message::user("1")], &opts).await.unwrap();
        let r2 = model.generate(&[Message::user("2")], &opts).await.unwrap();
        assert_eq!(r1.message.content(), "first");
        assert_eq!(r2.message.content(), "done");
        assert_eq!(model.call_count(), 2);
        assert_eq!(model.requests()[1].messages[0].content(), "2");
    }

    #[tokio::test]
    async fn streams_text_in_word_chunks() {
        let model = ScriptedChatModel::with_response("hello brave world");
        let events = drain(model.stream(&[], &CallOptions::default()).await.unwrap()).await;
        assert_eq!(
            events,
            vec![
                ChatStreamEvent::Token("hello ".into()),
                ChatStreamEvent::Token("brave ".into()),
                ChatStreamEvent::Token("world".into()),
                ChatStreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn streams_tool_call_arguments_in_fragments() {
        let model = ScriptedChatModel::new(vec![ScriptedResponse::tool_calls([(
            "search",
            json!({"query": "rust"}),
        )])]);
        let events = drain(model.stream(&[], &CallOptions::default()).await.unwrap()).await;
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], ChatStreamEvent::ToolCallStart { id, name } if id == "call_0" && name == "search"));
        let joined: String = events
            .iter()
            .filter_map(|e| match e {
                ChatStreamEvent::ToolCallDelta { arguments, .. } => Some(arguments.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(joined, r#"{"query":"rust"}"#);
    }

    #[tokio::test]
    async fn fail_response_is_model_error() {
        let model = ScriptedChatModel::new(vec![ScriptedResponse::Fail("boom".into())]);
        let err = model.generate(&[], &CallOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), "model");
    }

    #[test]
    fn split_in_two_respects_char_boundaries() {
        let (a, b) = split_in_two("héllo");
        assert_eq!(format!("{a}{b}"), "héllo");
    }
}
