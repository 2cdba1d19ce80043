use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use relay_core::error::{GraphError, RelayError, Result};

use crate::context::RunContext;
use crate::event::{PAUSE, StepOutput, WorkflowEvent};

/// Boxed future returned by a step.
pub type StepFuture<E> = Pin<Box<dyn Future<Output = Result<Vec<StepOutput<E>>>> + Send>>;

type AsyncStepFn<E, S> = dyn Fn(RunContext<S>, E) -> StepFuture<E> + Send + Sync;

/// Error for a step handed a variant other than the one it is routed.
pub fn unexpected_event<E: WorkflowEvent>(step: &str, event: &E) -> RelayError {
    GraphError::InvalidGraph(format!("Step '{step}' cannot handle event '{}'", event.tag())).into()
}

/// A named async handler bound to one event tag.
///
/// Declares the tags it may emit so wiring can be checked before a run.
pub struct StepFn<E, S> {
    name: String,
    accepts: &'static str,
    emits: Vec<&'static str>,
    awaits: Option<&'static str>,
    func: Arc<AsyncStepFn<E, S>>,
}

impl<E, S> Clone for StepFn<E, S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            accepts: self.accepts,
            emits: self.emits.clone(),
            awaits: self.awaits,
            func: Arc::clone(&self.func),
        }
    }
}

impl<E: 'static, S: 'static> StepFn<E, S> {
    pub fn new<F, Fut>(name: impl Into<String>, accepts: &'static str, func: F) -> Self
    where
        F: Fn(RunContext<S>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<StepOutput<E>>>> + Send + 'static,
    {
        Self {
            name: name.into(),
            accepts,
            emits: Vec::new(),
            awaits: None,
            func: Arc::new(move |ctx, event| Box::pin(func(ctx, event))),
        }
    }
}

impl<E, S> StepFn<E, S> {
    /// Declare tags this step may emit (event tags, `STOP` or `PAUSE`).
    pub fn emits(mut self, tags: &[&'static str]) -> Self {
        for tag in tags {
            if !self.emits.contains(tag) {
                self.emits.push(tag);
            }
        }
        self
    }

    /// Declare that this step may pause awaiting an event tagged `tag`.
    pub fn awaits(mut self, tag: &'static str) -> Self {
        self.awaits = Some(tag);
        self.emits(&[PAUSE])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self) -> &'static str {
        self.accepts
    }

    pub fn emitted(&self) -> &[&'static str] {
        &self.emits
    }

    pub fn awaited(&self) -> Option<&'static str> {
        self.awaits
    }

    pub fn may_emit(&self, tag: &str) -> bool {
        self.emits.iter().any(|t| *t == tag)
    }

    pub fn invoke(&self, ctx: RunContext<S>, event: E) -> StepFuture<E> {
        (self.func)(ctx, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::STOP;

    #[test]
    fn awaits_implies_pause() {
        let step: StepFn<(), ()> = StepFn::new("gate", "input", |_ctx, _ev| async { Ok(Vec::new()) })
            .emits(&["done"])
            .awaits("answer");
        assert!(step.may_emit(PAUSE));
        assert!(step.may_emit("done"));
        assert!(!step.may_emit(STOP));
        assert_eq!(step.awaited(), Some("answer"));
    }

    #[test]
    fn emits_deduplicates() {
        let step: StepFn<(), ()> =
            StepFn::new("s", "a", |_ctx, _ev| async { Ok(Vec::new()) }).emits(&["b", "b", STOP]);
        assert_eq!(step.emitted(), &["b", STOP]);
        assert_eq!(step.name(), "s");
        assert_eq!(step.accepts(), "a");
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum Ev {
        Draft,
    }

    impl WorkflowEvent for Ev {
        const TAGS: &'static [&'static str] = &["draft"];

        fn tag(&self) -> &'static str {
            "draft"
        }
    }

    #[test]
    fn unexpected_event_names_step_and_tag() {
        match unexpected_event("review", &Ev::Draft) {
            RelayError::Graph(GraphError::InvalidGraph(msg)) => {
                assert!(msg.contains("'review'"));
                assert!(msg.contains("'draft'"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
