use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use relay_checkpoint::types::RunSnapshot;
use relay_core::error::{GraphError, RelayError, Result};

use crate::event::{PauseRequest, StopSignal};
use crate::notification::Notification;

/// A run that suspended waiting for a human.
#[derive(Debug, Clone)]
pub struct PausedRun {
    pub request_id: String,
    pub request: PauseRequest,
    /// What was (or would be) persisted; also usable for an in-process resume.
    pub snapshot: RunSnapshot,
}

/// Item produced by a running workflow.
#[derive(Debug)]
pub enum RunEvent {
    Notification(Notification),
    Stop(StopSignal),
    Paused(PausedRun),
}

/// Final result of a fully drained run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        text: String,
        notifications: Vec<Notification>,
    },
    Paused {
        paused: PausedRun,
        notifications: Vec<Notification>,
    },
}

impl RunOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed { text, .. } => Some(text),
            RunOutcome::Paused { .. } => None,
        }
    }

    pub fn paused(&self) -> Option<&PausedRun> {
        match self {
            RunOutcome::Paused { paused, .. } => Some(paused),
            RunOutcome::Completed { .. } => None,
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        match self {
            RunOutcome::Completed { notifications, .. } | RunOutcome::Paused { notifications, .. } => {
                notifications
            }
        }
    }
}

type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent>> + Send>>;

/// Pull-based handle on one run.
///
/// Nothing executes until the first poll. Dropping the handler cancels the run.
pub struct WorkflowHandler {
    run_id: Uuid,
    request_id: String,
    cancel: CancellationToken,
    _guard: DropGuard,
    events: RunEventStream,
}

impl WorkflowHandler {
    pub(crate) fn new(run_id: Uuid, request_id: String, cancel: CancellationToken, events: RunEventStream) -> Self {
        Self {
            run_id,
            request_id,
            _guard: cancel.clone().drop_guard(),
            cancel,
            events,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drive the run to its end, buffering the final text.
    ///
    /// Runs the stop signal's completion hook and appends its notifications.
    pub async fn collect_outcome(mut self) -> Result<RunOutcome> {
        let mut notifications = Vec::new();
        while let Some(event) = self.next().await {
            match event? {
                RunEvent::Notification(n) => notifications.push(n),
                RunEvent::Stop(signal) => {
                    let (payload, hook) = signal.into_parts();
                    let text = payload.collect().await?;
                    if let Some(hook) = hook {
                        notifications.extend(hook(text.clone()).await);
                    }
                    return Ok(RunOutcome::Completed {
                        text,
                        notifications,
                    });
                }
                RunEvent::Paused(paused) => {
                    return Ok(RunOutcome::Paused {
                        paused,
                        notifications,
                    });
                }
            }
        }
        Err(RelayError::from(GraphError::QueueExhausted))
    }
}

impl Stream for WorkflowHandler {
    type Item = Result<RunEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for WorkflowHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandler")
            .field("run_id", &self.run_id)
            .field("request_id", &self.request_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
