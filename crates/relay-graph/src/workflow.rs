use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use relay_checkpoint::store::SnapshotStore;
use relay_core::config::RunConfig;
use relay_core::error::{GraphError, Result};

use crate::context::{ContextState, WorkflowState};
use crate::dispatch::dispatch;
use crate::event::{PauseRequest, WorkflowEvent};
use crate::handler::WorkflowHandler;
use crate::step::StepFn;

/// Answers a pause in-process instead of suspending the run.
pub type HumanResponder<E> = Arc<dyn Fn(&PauseRequest) -> Vec<E> + Send + Sync>;

/// Everything a single run needs besides its start event and context.
pub struct RunOptions<E> {
    pub config: RunConfig,
    /// Where paused runs are persisted. Without one, the snapshot is only
    /// surfaced in the paused event.
    pub store: Option<Arc<dyn SnapshotStore>>,
    pub responder: Option<HumanResponder<E>>,
}

impl<E> Default for RunOptions<E> {
    fn default() -> Self {
        Self {
            config: RunConfig::default(),
            store: None,
            responder: None,
        }
    }
}

impl<E> Clone for RunOptions<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            responder: self.responder.clone(),
        }
    }
}

impl<E> RunOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&PauseRequest) -> Vec<E> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }
}

impl<E> fmt::Debug for RunOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

struct WorkflowInner<E, S> {
    name: String,
    start: &'static str,
    steps: Vec<StepFn<E, S>>,
    routes: HashMap<&'static str, usize>,
}

/// A validated workflow, ready to run any number of times.
///
/// Created by [`WorkflowBuilder::compile`](crate::builder::WorkflowBuilder::compile).
/// Cheap to clone; runs share nothing but the step definitions.
pub struct Workflow<E, S> {
    inner: Arc<WorkflowInner<E, S>>,
}

impl<E, S> Clone for Workflow<E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: WorkflowEvent, S: WorkflowState> Workflow<E, S> {
    pub(crate) fn new(
        name: String,
        start: &'static str,
        steps: Vec<StepFn<E, S>>,
        routes: HashMap<&'static str, usize>,
    ) -> Self {
        Self {
            inner: Arc::new(WorkflowInner {
                name,
                start,
                steps,
                routes,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start_tag(&self) -> &'static str {
        self.inner.start
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.inner.steps.iter().map(|s| s.name()).collect()
    }

    /// Name of the step that consumes `tag`.
    pub fn consumer_of(&self, tag: &str) -> Option<&str> {
        self.inner.routes.get(tag).map(|&idx| self.inner.steps[idx].name())
    }

    pub(crate) fn step_for(&self, tag: &str) -> Result<&StepFn<E, S>> {
        self.inner
            .routes
            .get(tag)
            .map(|&idx| &self.inner.steps[idx])
            .ok_or_else(|| GraphError::NoConsumer { tag: tag.into() }.into())
    }

    /// Start a run. Nothing executes until the handler is polled.
    pub fn run(&self, start: E, context: ContextState<S>, options: RunOptions<E>) -> WorkflowHandler {
        if start.tag() != self.inner.start {
            tracing::warn!(
                workflow = %self.inner.name,
                expected = self.inner.start,
                got = start.tag(),
                "run started with a non-start event"
            );
        }
        self.launch(VecDeque::from([start]), context, options, 0)
    }

    pub(crate) fn launch(
        &self,
        queue: VecDeque<E>,
        context: ContextState<S>,
        options: RunOptions<E>,
        dispatched: usize,
    ) -> WorkflowHandler {
        let cancel = CancellationToken::new();
        let run_id = options.config.run_id;
        let request_id = options
            .config
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let events = dispatch(
            self.clone(),
            queue,
            context,
            options,
            dispatched,
            cancel.clone(),
            request_id.clone(),
        );
        WorkflowHandler::new(run_id, request_id, cancel, Box::pin(events))
    }
}

impl<E, S> fmt::Debug for Workflow<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.inner.name)
            .field("start", &self.inner.start)
            .field("steps", &self.inner.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}
