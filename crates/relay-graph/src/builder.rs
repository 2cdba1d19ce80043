use std::collections::{HashMap, HashSet, VecDeque};

use relay_core::error::{GraphError, Result};

use crate::context::WorkflowState;
use crate::event::{PAUSE, STOP, WorkflowEvent};
use crate::step::StepFn;
use crate::workflow::Workflow;

/// Builder for constructing a workflow.
///
/// Use `add_step` and `set_start` to define the wiring, then call
/// `compile()` to validate it and produce a [`Workflow`].
pub struct WorkflowBuilder<E, S> {
    name: String,
    steps: Vec<StepFn<E, S>>,
    start: Option<&'static str>,
}

impl<E: WorkflowEvent, S: WorkflowState> WorkflowBuilder<E, S> {
    /// Create a new, empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            start: None,
        }
    }

    /// Add a step to the workflow.
    ///
    /// Returns an error if a step with the same name already exists.
    pub fn add_step(&mut self, step: StepFn<E, S>) -> Result<&mut Self> {
        if self.steps.iter().any(|s| s.name() == step.name()) {
            return Err(GraphError::InvalidGraph(format!("Duplicate step name: '{}'", step.name())).into());
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Set the tag of the event that starts a run.
    pub fn set_start(&mut self, tag: &'static str) -> &mut Self {
        self.start = Some(tag);
        self
    }

    /// Validate the wiring and produce a `Workflow`.
    pub fn compile(self) -> Result<Workflow<E, S>> {
        let start = self.validate()?;
        let routes = self
            .steps
            .iter()
            .enumerate()
            .map(|(idx, step)| (step.accepts(), idx))
            .collect();
        Ok(Workflow::new(self.name, start, self.steps, routes))
    }

    fn validate(&self) -> Result<&'static str> {
        // 1. Start tag must be set and known
        let start = self
            .start
            .ok_or_else(|| GraphError::InvalidGraph("Start event not set".to_string()))?;
        self.validate_tag(start, "start event")?;

        // 2. Every declared tag must belong to the event type
        for step in &self.steps {
            self.validate_tag(step.accepts(), &format!("input of step '{}'", step.name()))?;
            for tag in step.emitted() {
                if *tag != STOP && *tag != PAUSE {
                    self.validate_tag(tag, &format!("output of step '{}'", step.name()))?;
                }
            }
            if let Some(tag) = step.awaited() {
                self.validate_tag(tag, &format!("awaited response of step '{}'", step.name()))?;
            }
        }

        // 3. Each tag is consumed by at most one step
        let mut consumers: HashMap<&str, Vec<String>> = HashMap::new();
        for step in &self.steps {
            consumers
                .entry(step.accepts())
                .or_default()
                .push(step.name().to_string());
        }
        if let Some((tag, steps)) = consumers.iter().find(|(_, steps)| steps.len() > 1) {
            let mut steps = steps.clone();
            steps.sort();
            return Err(GraphError::AmbiguousRoute {
                tag: tag.to_string(),
                steps,
            }
            .into());
        }

        // 4. The start tag and everything a step produces must have a consumer
        let consumed = |tag: &str| consumers.contains_key(tag);
        if !consumed(start) {
            return Err(GraphError::NoConsumer { tag: start.into() }.into());
        }
        for step in &self.steps {
            let produced = step
                .emitted()
                .iter()
                .copied()
                .filter(|t| *t != STOP && *t != PAUSE)
                .chain(step.awaited());
            for tag in produced {
                if !consumed(tag) {
                    return Err(GraphError::NoConsumer { tag: tag.into() }.into());
                }
            }
        }

        // 5. The run must be able to finish
        if !self.steps.iter().any(|s| s.may_emit(STOP)) {
            return Err(GraphError::InvalidGraph("No step can emit the stop event".to_string()).into());
        }

        // 6. BFS reachability over tags from the start event (cycles are allowed)
        self.validate_reachability(start)?;

        Ok(start)
    }

    fn validate_tag(&self, tag: &str, context: &str) -> Result<()> {
        if !E::TAGS.contains(&tag) {
            return Err(GraphError::InvalidGraph(format!("Unknown event '{tag}' used as {context}")).into());
        }
        Ok(())
    }

    fn validate_reachability(&self, start: &'static str) -> Result<()> {
        let by_tag: HashMap<&str, &StepFn<E, S>> =
            self.steps.iter().map(|s| (s.accepts(), s)).collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);

        while let Some(tag) = queue.pop_front() {
            let Some(step) = by_tag.get(tag) else { continue };
            let next = step.emitted().iter().copied().chain(step.awaited());
            for next in next {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        for step in &self.steps {
            if !visited.contains(step.accepts()) {
                return Err(GraphError::InvalidGraph(format!(
                    "Step '{}' is not reachable from start event '{start}'",
                    step.name()
                ))
                .into());
            }
        }
        Ok(())
    }
}
