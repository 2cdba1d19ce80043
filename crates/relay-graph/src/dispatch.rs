//! The dispatch loop behind every run.
//!
//! Control events are popped from a FIFO queue and routed to the single step
//! that accepts their tag. Events a step returns go to the tail of the queue.
//! Notifications sent through the run context are forwarded as soon as they
//! arrive, in emission order. The loop ends on a stop signal, on a pause, or
//! with an error.

use std::collections::VecDeque;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use relay_checkpoint::types::RunSnapshot;
use relay_core::config::RunConfig;
use relay_core::error::{GraphError, RelayError, Result, ResumeError};
use relay_core::model::TextChunkStream;

use crate::context::{ContextState, RunContext, WorkflowState};
use crate::event::{PauseRequest, StepOutput, StopPayload, StopSignal, WorkflowEvent};
use crate::handler::{PausedRun, RunEvent};
use crate::notification::Notification;
use crate::step::StepFn;
use crate::workflow::{RunOptions, Workflow};

enum Tick<E> {
    Cancelled,
    TimedOut,
    Notice(Notification),
    Done(Result<Vec<StepOutput<E>>>),
}

enum Terminal {
    Stop(StopSignal),
    Pause(PauseRequest),
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub(crate) fn dispatch<E: WorkflowEvent, S: WorkflowState>(
    workflow: Workflow<E, S>,
    mut queue: VecDeque<E>,
    context: ContextState<S>,
    options: RunOptions<E>,
    mut dispatched: usize,
    cancel: CancellationToken,
    request_id: String,
) -> impl Stream<Item = Result<RunEvent>> + Send + 'static {
    try_stream! {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let run_id = options.config.run_id;
        let ctx = RunContext::new(context, notify_tx, cancel.clone(), run_id, &request_id);
        let max_steps = options.config.max_steps;
        let timeout_ms = options.config.timeout_ms;
        let deadline = options.config.timeout().map(|t| Instant::now() + t);

        loop {
            let event = queue.pop_front().ok_or(GraphError::QueueExhausted)?;
            check_step_limit(dispatched, max_steps)?;
            let step = workflow.step_for(event.tag())?.clone();
            dispatched += 1;
            tracing::debug!(
                workflow = %workflow.name(),
                step = %step.name(),
                event = event.tag(),
                dispatched,
                "dispatching event"
            );

            let mut running = step.invoke(ctx.clone(), event);
            let outcome = loop {
                let tick = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Tick::Cancelled,
                    _ = deadline_reached(deadline) => Tick::TimedOut,
                    Some(notice) = notify_rx.recv() => Tick::Notice(notice),
                    result = &mut running => Tick::Done(result),
                };
                match tick {
                    Tick::Notice(notice) => yield RunEvent::Notification(notice),
                    Tick::Done(result) => break result.map_err(|e| step_failed(step.name(), e)),
                    Tick::Cancelled => break Err(RelayError::Cancelled),
                    Tick::TimedOut => break Err(RelayError::Timeout { after_ms: timeout_ms.unwrap_or_default() }),
                }
            };
            drop(running);
            if let Err(e) = &outcome {
                tracing::warn!(workflow = %workflow.name(), step = %step.name(), error = %e, "run failed");
            }
            let outputs = outcome?;

            while let Ok(notice) = notify_rx.try_recv() {
                yield RunEvent::Notification(notice);
            }

            let (events, terminal) = split_outputs(&step, outputs)?;
            queue.extend(events);

            match terminal {
                None => continue,
                Some(Terminal::Stop(signal)) => {
                    tracing::info!(
                        workflow = %workflow.name(),
                        run_id = %run_id,
                        tags = ?options.config.tags,
                        dispatched,
                        undispatched = queue.len(),
                        "run stopped"
                    );
                    yield RunEvent::Stop(bound_stop(signal, deadline, timeout_ms));
                    break;
                }
                Some(Terminal::Pause(request)) => {
                    if let Some(responder) = &options.responder {
                        let responses = responder(&request);
                        check_responses(&request, &responses)?;
                        tracing::debug!(step = %step.name(), responses = responses.len(), "pause answered inline");
                        queue.extend(responses);
                        continue;
                    }

                    let snapshot = capture(&workflow, &queue, &ctx, &request, dispatched, step.name(), &options.config)?;
                    if let Some(store) = &options.store {
                        store.save(&snapshot).await?;
                    }
                    tracing::info!(
                        workflow = %workflow.name(),
                        request_id = %request_id,
                        tags = ?options.config.tags,
                        awaiting = %request.response_tag,
                        "run paused"
                    );
                    yield RunEvent::Paused(PausedRun {
                        request_id: request_id.clone(),
                        request,
                        snapshot,
                    });
                    break;
                }
            }
        }
    }
}

/// Hold a streamed final answer to the run's deadline.
fn bound_stop(mut signal: StopSignal, deadline: Option<Instant>, timeout_ms: Option<u64>) -> StopSignal {
    let Some(deadline) = deadline else { return signal };
    signal.payload = match signal.payload {
        StopPayload::Stream(stream) => StopPayload::Stream(until_deadline(stream, deadline, timeout_ms.unwrap_or_default())),
        text => text,
    };
    signal
}

fn until_deadline(mut stream: TextChunkStream, deadline: Instant, after_ms: u64) -> TextChunkStream {
    Box::pin(try_stream! {
        loop {
            let next = tokio::select! {
                biased;
                chunk = stream.next() => Ok(chunk),
                _ = tokio::time::sleep_until(deadline) => Err(RelayError::Timeout { after_ms }),
            };
            let Some(chunk) = next? else { break };
            yield chunk?;
        }
    })
}

fn check_step_limit(dispatched: usize, max_steps: usize) -> Result<()> {
    if dispatched >= max_steps {
        return Err(GraphError::StepLimit { limit: max_steps }.into());
    }
    Ok(())
}

fn step_failed(step: &str, error: RelayError) -> RelayError {
    if error.is_cancelled() || error.is_timeout() {
        return error;
    }
    GraphError::StepExecution {
        step: step.to_string(),
        source: Box::new(error),
    }
    .into()
}

/// Check each output against the step's declaration and separate the
/// control events from the (at most one) terminal output.
fn split_outputs<E: WorkflowEvent, S>(
    step: &StepFn<E, S>,
    outputs: Vec<StepOutput<E>>,
) -> Result<(Vec<E>, Option<Terminal>)> {
    let mut events = Vec::with_capacity(outputs.len());
    let mut terminal = None;
    for output in outputs {
        let tag = output.tag();
        if !step.may_emit(tag) {
            return Err(GraphError::UndeclaredEvent {
                step: step.name().to_string(),
                tag: tag.to_string(),
            }
            .into());
        }
        let next = match output {
            StepOutput::Event(event) => {
                events.push(event);
                continue;
            }
            StepOutput::Stop(signal) => Terminal::Stop(signal),
            StepOutput::Pause(request) => {
                if step.awaited() != Some(request.response_tag.as_str()) {
                    return Err(GraphError::UndeclaredEvent {
                        step: step.name().to_string(),
                        tag: request.response_tag,
                    }
                    .into());
                }
                Terminal::Pause(request)
            }
        };
        if terminal.replace(next).is_some() {
            return Err(GraphError::InvalidGraph(format!(
                "Step '{}' produced more than one stop or pause",
                step.name()
            ))
            .into());
        }
    }
    Ok((events, terminal))
}

fn check_responses<E: WorkflowEvent>(request: &PauseRequest, responses: &[E]) -> Result<()> {
    if responses.is_empty() {
        return Err(ResumeError::NotResumable("no human response supplied".into()).into());
    }
    match responses.iter().find(|r| r.tag() != request.response_tag) {
        Some(other) => Err(ResumeError::NotResumable(format!(
            "run awaits '{}', got '{}'",
            request.response_tag,
            other.tag()
        ))
        .into()),
        None => Ok(()),
    }
}

fn capture<E: WorkflowEvent, S: WorkflowState>(
    workflow: &Workflow<E, S>,
    queue: &VecDeque<E>,
    ctx: &RunContext<S>,
    request: &PauseRequest,
    dispatched: usize,
    paused_by: &str,
    config: &RunConfig,
) -> Result<RunSnapshot> {
    let mut snapshot = RunSnapshot::new(ctx.request_id(), workflow.name(), ctx.run_id());
    snapshot.pending_events = queue
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<_, _>>()?;
    snapshot.expected_responses = vec![request.response_tag.clone()];
    snapshot.context = serde_json::to_value(ctx.snapshot())?;
    snapshot.dispatched = dispatched;
    snapshot.paused_by = paused_by.to_string();
    snapshot.tags = config.tags.clone();
    snapshot.metadata = config.metadata.clone();
    Ok(snapshot)
}
