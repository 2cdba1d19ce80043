use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use relay_checkpoint::store::SnapshotStore;
use relay_core::config::RunConfig;
use relay_core::error::Result;
use relay_core::message::Message;
use relay_graph::context::{ContextState, WorkflowState};
use relay_graph::event::WorkflowEvent;
use relay_graph::handler::WorkflowHandler;
use relay_graph::workflow::{RunOptions, Workflow};

/// A workflow the transport can start and resume without knowing its
/// event and state types.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    fn name(&self) -> &str;

    /// Start a run over the caller's conversation.
    fn start(&self, messages: Vec<Message>, config: RunConfig) -> WorkflowHandler;

    /// Continue a paused run. `responses` are deserialized into the
    /// workflow's event type before the snapshot is touched.
    async fn resume(&self, request_id: &str, responses: Vec<Value>) -> Result<WorkflowHandler>;
}

/// [`WorkflowService`] over a compiled [`Workflow`] and a snapshot store.
pub struct ServedWorkflow<E, S> {
    workflow: Workflow<E, S>,
    start_event: E,
    store: Arc<dyn SnapshotStore>,
    defaults: RunConfig,
}

impl<E: WorkflowEvent, S: WorkflowState + Default> ServedWorkflow<E, S> {
    pub fn new(workflow: Workflow<E, S>, start_event: E, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            workflow,
            start_event,
            store,
            defaults: RunConfig::default(),
        }
    }

    /// Step limit and timeout applied to every run.
    pub fn with_defaults(mut self, defaults: RunConfig) -> Self {
        self.defaults = defaults;
        self
    }

    fn options(&self, mut config: RunConfig) -> RunOptions<E> {
        config.max_steps = self.defaults.max_steps;
        if config.timeout_ms.is_none() {
            config.timeout_ms = self.defaults.timeout_ms;
        }
        RunOptions::new()
            .with_config(config)
            .with_store(Arc::clone(&self.store))
    }
}

#[async_trait]
impl<E: WorkflowEvent, S: WorkflowState + Default> WorkflowService for ServedWorkflow<E, S> {
    fn name(&self) -> &str {
        self.workflow.name()
    }

    fn start(&self, messages: Vec<Message>, config: RunConfig) -> WorkflowHandler {
        let options = self.options(config);
        self.workflow
            .run(self.start_event.clone(), ContextState::from_messages(messages), options)
    }

    async fn resume(&self, request_id: &str, responses: Vec<Value>) -> Result<WorkflowHandler> {
        let responses = responses
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<E>, _>>()?;
        let options = self.options(RunConfig::default());
        self.workflow
            .resume(request_id, responses, Arc::clone(&self.store), options)
            .await
    }
}
