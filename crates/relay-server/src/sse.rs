use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;

use relay_graph::bridge::{SideChannel, SideEvent, bridge};
use relay_graph::handler::WorkflowHandler;

use crate::types::ChatSseEvent;

/// Create an SSE response from a stream of events with keep-alive.
/// Uses a 5-second interval to prevent proxy/network timeouts during long operations.
pub fn sse_response<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("keepalive"),
    )
}

/// Create an SSE Event from a serializable value.
pub fn sse_event<T: Serialize>(data: &T) -> Result<Event, Infallible> {
    let json = serde_json::to_string(data).unwrap_or_else(|_| "{}".into());
    Ok(Event::default().data(json))
}

/// Create an SSE done event.
pub fn sse_done() -> Result<Event, Infallible> {
    Ok(Event::default().data("[DONE]"))
}

fn side_frames(side: &SideChannel) -> Vec<ChatSseEvent> {
    side.drain()
        .into_iter()
        .map(|event| match event {
            SideEvent::Notification { notification } => ChatSseEvent::Annotation { notification },
            SideEvent::Paused {
                request_id,
                response_tag,
                payload,
            } => ChatSseEvent::Paused {
                request_id,
                response_tag,
                payload,
            },
        })
        .collect()
}

/// Render a run as SSE frames.
///
/// Side events are forwarded as soon as the run produces them, and always
/// ahead of the chunk that follows them. A run error becomes an `error`
/// frame and ends the stream; every stream ends with `[DONE]`. Dropping the
/// stream cancels the run.
pub fn run_events(handler: WorkflowHandler) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let request_id = handler.request_id().to_string();
    let (mut chunks, side) = bridge(handler);
    stream! {
        loop {
            let next = tokio::select! {
                biased;
                next = chunks.next() => Some(next),
                _ = side.changed() => None,
            };
            for frame in side_frames(&side) {
                yield sse_event(&frame);
            }
            let Some(next) = next else { continue };
            match next {
                Some(Ok(delta)) => yield sse_event(&ChatSseEvent::Text { delta }),
                Some(Err(e)) => {
                    tracing::warn!(request_id = %request_id, error = %e, "run ended with an error");
                    yield sse_event(&ChatSseEvent::Error {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                    break;
                }
                None => break,
            }
        }
        yield sse_done();
    }
}
