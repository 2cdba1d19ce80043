use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;

use relay_core::error::{RelayError, Result};
use relay_core::model::TextChunkStream;

use crate::event::StopPayload;
use crate::handler::{RunEvent, WorkflowHandler};
use crate::notification::Notification;

/// Out-of-band item delivered next to the text stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEvent {
    Notification { notification: Notification },
    Paused {
        request_id: String,
        response_tag: String,
        payload: Value,
    },
}

#[derive(Default)]
struct SideState {
    events: VecDeque<SideEvent>,
    closed: bool,
}

/// Accumulates structured notifications for a bridged run.
///
/// Cloneable; every clone sees the same buffer. Side events are pushed while
/// the text stream is being polled, even if no chunk comes out of that poll;
/// await [`SideChannel::changed`] next to the text stream to forward them as
/// they arrive.
#[derive(Clone, Default)]
pub struct SideChannel {
    inner: Arc<Mutex<SideState>>,
    wake: Arc<Notify>,
}

impl SideChannel {
    fn lock(&self) -> MutexGuard<'_, SideState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: SideEvent) {
        self.lock().events.push_back(event);
        self.wake.notify_one();
    }

    fn close(&self) {
        self.lock().closed = true;
        self.wake.notify_one();
    }

    /// Resolves after the next push or close. A push that happened since
    /// the last wait resolves it immediately.
    pub async fn changed(&self) {
        self.wake.notified().await;
    }

    /// Take everything accumulated so far.
    pub fn drain(&self) -> Vec<SideEvent> {
        self.lock().events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the run has ended; nothing more will be pushed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl std::fmt::Debug for SideChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SideChannel")
            .field("pending", &state.events.len())
            .field("closed", &state.closed)
            .finish()
    }
}

struct CloseOnDrop(SideChannel);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Split a run into caller-facing text and structured side events.
///
/// The run is pulled lazily by the returned stream. A streamed stop payload
/// is relayed chunk by chunk until the run is cancelled; a text payload
/// becomes a single chunk. Dropping the stream drops the handler, which
/// cancels the run.
pub fn bridge(handler: WorkflowHandler) -> (TextChunkStream, SideChannel) {
    let side = SideChannel::default();
    let chunks = relay(handler, side.clone());
    (Box::pin(chunks), side)
}

fn relay(mut handler: WorkflowHandler, sink: SideChannel) -> impl Stream<Item = Result<String>> + Send + 'static {
    let closer = CloseOnDrop(sink.clone());
    let cancel = handler.cancellation_token();
    try_stream! {
        let _closer = closer;
        while let Some(event) = handler.next().await {
            match event? {
                RunEvent::Notification(notification) => {
                    sink.push(SideEvent::Notification { notification });
                }
                RunEvent::Paused(paused) => {
                    sink.push(SideEvent::Paused {
                        request_id: paused.request_id,
                        response_tag: paused.request.response_tag,
                        payload: paused.request.payload,
                    });
                }
                RunEvent::Stop(signal) => {
                    let (payload, hook) = signal.into_parts();
                    let mut full = String::new();
                    match payload {
                        StopPayload::Text(text) => {
                            full.push_str(&text);
                            if !text.is_empty() {
                                yield text;
                            }
                        }
                        StopPayload::Stream(mut stream) => loop {
                            let next = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => Err(RelayError::Cancelled),
                                chunk = stream.next() => Ok(chunk),
                            };
                            let Some(chunk) = next? else { break };
                            let chunk = chunk?;
                            full.push_str(&chunk);
                            yield chunk;
                        },
                    }
                    if let Some(hook) = hook {
                        for notification in hook(full).await {
                            sink.push(SideEvent::Notification { notification });
                        }
                    }
                }
            }
        }
    }
}
