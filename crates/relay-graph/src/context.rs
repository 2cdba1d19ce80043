use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use relay_core::memory::Memory;
use relay_core::message::Message;

use crate::notification::Notification;

/// Workflow-specific state carried by a run and captured in snapshots.
pub trait WorkflowState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> WorkflowState for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The serializable part of a run: conversation memory plus workflow state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextState<S> {
    pub memory: Memory,
    pub state: S,
}

impl<S> ContextState<S> {
    pub fn new(memory: Memory, state: S) -> Self {
        Self { memory, state }
    }
}

impl<S: Default> ContextState<S> {
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self::new(Memory::from_messages(messages), S::default())
    }
}

/// Per-run handle passed to every step.
///
/// Clones share the same state. The lock is never held across an await.
pub struct RunContext<S> {
    inner: Arc<Mutex<ContextState<S>>>,
    notify: mpsc::UnboundedSender<Notification>,
    cancel: CancellationToken,
    run_id: Uuid,
    request_id: Arc<str>,
}

impl<S> Clone for RunContext<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            notify: self.notify.clone(),
            cancel: self.cancel.clone(),
            run_id: self.run_id,
            request_id: Arc::clone(&self.request_id),
        }
    }
}

impl<S> RunContext<S> {
    pub(crate) fn new(
        state: ContextState<S>,
        notify: mpsc::UnboundedSender<Notification>,
        cancel: CancellationToken,
        run_id: Uuid,
        request_id: &str,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            notify,
            cancel,
            run_id,
            request_id: Arc::from(request_id),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContextState<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Snapshot of the conversation so far.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().memory.get_messages().to_vec()
    }

    pub fn put(&self, message: Message) {
        self.lock().memory.put(message);
    }

    pub fn put_all(&self, messages: impl IntoIterator<Item = Message>) {
        self.lock().memory.put_all(messages);
    }

    pub fn set_messages(&self, messages: Vec<Message>) {
        self.lock().memory.set(messages);
    }

    pub fn with_memory<R>(&self, f: impl FnOnce(&Memory) -> R) -> R {
        f(&self.lock().memory)
    }

    pub fn update_state<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.lock().state)
    }

    /// Forward a notification to the caller right away.
    pub fn send_event(&self, notification: Notification) {
        if self.notify.send(notification).is_err() {
            tracing::debug!(run_id = %self.run_id, "notification dropped, run no longer observed");
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<S: Clone> RunContext<S> {
    pub fn state(&self) -> S {
        self.lock().state.clone()
    }

    pub(crate) fn snapshot(&self) -> ContextState<S> {
        self.lock().clone()
    }
}
