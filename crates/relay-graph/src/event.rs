use std::fmt;

use futures::StreamExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use relay_core::error::Result;
use relay_core::model::TextChunkStream;

use crate::notification::Notification;

/// Pseudo-tag a step declares when it may end the run.
pub const STOP: &str = "__stop__";

/// Pseudo-tag a step declares when it may pause for human input.
pub const PAUSE: &str = "__pause__";

/// A workflow's control events.
///
/// Implemented by a `#[serde(tag = "type")]` enum whose `tag` is an
/// exhaustive match; `TAGS` lists every tag the enum can produce.
pub trait WorkflowEvent:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    const TAGS: &'static [&'static str];

    fn tag(&self) -> &'static str;
}

/// Side effect run once the final text is fully delivered.
pub type CompletionHook = Box<dyn FnOnce(String) -> BoxFuture<'static, Vec<Notification>> + Send>;

/// Final output of a run.
pub enum StopPayload {
    Text(String),
    Stream(TextChunkStream),
}

impl StopPayload {
    /// Drain the payload into a single string.
    pub async fn collect(self) -> Result<String> {
        match self {
            StopPayload::Text(text) => Ok(text),
            StopPayload::Stream(mut stream) => {
                let mut out = String::new();
                while let Some(chunk) = stream.next().await {
                    out.push_str(&chunk?);
                }
                Ok(out)
            }
        }
    }
}

/// Terminal control event.
pub struct StopSignal {
    pub payload: StopPayload,
    pub on_complete: Option<CompletionHook>,
}

impl StopSignal {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: StopPayload::Text(text.into()),
            on_complete: None,
        }
    }

    pub fn stream(stream: TextChunkStream) -> Self {
        Self {
            payload: StopPayload::Stream(stream),
            on_complete: None,
        }
    }

    /// Attach a hook that receives the full text after the last chunk.
    pub fn with_completion(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.payload, StopPayload::Stream(_))
    }

    pub fn into_parts(self) -> (StopPayload, Option<CompletionHook>) {
        (self.payload, self.on_complete)
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = match &self.payload {
            StopPayload::Text(text) => format!("Text({text:?})"),
            StopPayload::Stream(_) => "Stream(..)".to_string(),
        };
        f.debug_struct("StopSignal")
            .field("payload", &payload)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// A step's request to suspend until a human answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseRequest {
    /// Tag of the event the human response must carry.
    pub response_tag: String,
    /// What to show the human.
    pub payload: Value,
}

impl PauseRequest {
    pub fn new(response_tag: impl Into<String>, payload: Value) -> Self {
        Self {
            response_tag: response_tag.into(),
            payload,
        }
    }
}

/// One item returned by a step.
#[derive(Debug)]
pub enum StepOutput<E> {
    Event(E),
    Stop(StopSignal),
    Pause(PauseRequest),
}

impl<E: WorkflowEvent> StepOutput<E> {
    pub fn tag(&self) -> &'static str {
        match self {
            StepOutput::Event(event) => event.tag(),
            StepOutput::Stop(_) => STOP,
            StepOutput::Pause(_) => PAUSE,
        }
    }
}

impl<E> From<E> for StepOutput<E> {
    fn from(event: E) -> Self {
        StepOutput::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum Ev {
        Ping,
        Pong { n: u32 },
    }

    impl WorkflowEvent for Ev {
        const TAGS: &'static [&'static str] = &["ping", "pong"];

        fn tag(&self) -> &'static str {
            match self {
                Ev::Ping => "ping",
                Ev::Pong { .. } => "pong",
            }
        }
    }

    #[test]
    fn serde_tag_matches_event_tag() {
        let json = serde_json::to_value(Ev::Pong { n: 1 }).unwrap();
        assert_eq!(json["type"], "pong");
        let parsed: Ev = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.tag(), "pong");
    }

    #[test]
    fn output_tags() {
        assert_eq!(StepOutput::from(Ev::Ping).tag(), "ping");
        assert_eq!(StepOutput::<Ev>::Stop(StopSignal::text("x")).tag(), STOP);
        let pause = PauseRequest::new("pong", Value::Null);
        assert_eq!(StepOutput::<Ev>::Pause(pause).tag(), PAUSE);
    }

    #[tokio::test]
    async fn stream_payload_collects_in_order() {
        let chunks = futures::stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]);
        let signal = StopSignal::stream(Box::pin(chunks));
        assert!(signal.is_stream());
        let (payload, hook) = signal.into_parts();
        assert!(hook.is_none());
        assert_eq!(payload.collect().await.unwrap(), "ab");
    }

    #[test]
    fn debug_hides_stream() {
        let signal = StopSignal::stream(Box::pin(futures::stream::empty()))
            .with_completion(Box::new(|_| Box::pin(async { Vec::new() })));
        let debug = format!("{signal:?}");
        assert!(debug.contains("Stream(..)"));
        assert!(debug.contains("on_complete: true"));
    }
}
