//! Plan → write → review → report, with a bounded revision loop.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use relay_core::error::Result;
use relay_core::message::Message;
use relay_core::model::{CallOptions, ChatModel};
use relay_core::structured::generate_structured;
use relay_graph::builder::WorkflowBuilder;
use relay_graph::context::RunContext;
use relay_graph::event::{STOP, StepOutput, StopSignal, WorkflowEvent};
use relay_graph::notification::Notification;
use relay_graph::step::{StepFn, unexpected_event};
use relay_graph::workflow::Workflow;

const PLAN_PROMPT: &str = "You plan documents. Outline the sections needed to answer the \
user's request as a short numbered list.";

const WRITE_PROMPT: &str = "You write documents. Follow the outline and address the reviewer \
feedback when there is any. Reply with the document only.";

const REVIEW_PROMPT: &str = "You review documents against the user's request. Reply with JSON \
only: {\"approved\": bool, \"feedback\": string}.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriterEvent {
    Start,
    Write { attempt: u32, feedback: Option<String> },
    Review { attempt: u32, draft: String },
    Report { draft: String, approved: bool },
}

impl WorkflowEvent for WriterEvent {
    const TAGS: &'static [&'static str] = &["start", "write", "review", "report"];

    fn tag(&self) -> &'static str {
        match self {
            WriterEvent::Start => "start",
            WriterEvent::Write { .. } => "write",
            WriterEvent::Review { .. } => "review",
            WriterEvent::Report { .. } => "report",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriterState {
    pub plan: String,
    /// Write attempts made so far.
    pub attempts: u32,
}

/// Structured verdict returned by the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewDecision {
    pub approved: bool,
    pub feedback: String,
}

#[derive(Clone)]
pub struct WriterConfig {
    pub llm: Arc<dyn ChatModel>,
    /// Defaults to `llm`.
    pub reviewer: Option<Arc<dyn ChatModel>>,
    pub max_attempts: u32,
}

impl WriterConfig {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self {
            llm,
            reviewer: None,
            max_attempts: 3,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn ChatModel>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

async fn complete(llm: &dyn ChatModel, messages: &[Message]) -> Result<String> {
    let result = llm.generate(messages, &CallOptions::default()).await?;
    Ok(result.message.content().to_string())
}

/// Build the writer workflow. Start it with [`WriterEvent::Start`] and the
/// user's request in memory.
pub fn writer_workflow(config: WriterConfig) -> Result<Workflow<WriterEvent, WriterState>> {
    let llm = config.llm;
    let reviewer = config.reviewer.unwrap_or_else(|| Arc::clone(&llm));
    let max_attempts = config.max_attempts.max(1);

    let mut builder = WorkflowBuilder::<WriterEvent, WriterState>::new("writer");

    let planner = Arc::clone(&llm);
    builder.add_step(
        StepFn::new("plan", "start", move |ctx: RunContext<WriterState>, _event| {
            let llm = Arc::clone(&planner);
            async move {
                let messages = ctx.with_memory(|m| m.with_system_prompt(PLAN_PROMPT));
                let plan = complete(llm.as_ref(), &messages).await?;
                ctx.update_state(|s| s.plan = plan);
                ctx.send_event(Notification::agent_run("planner", "Outlined the document"));
                Ok(vec![
                    WriterEvent::Write {
                        attempt: 1,
                        feedback: None,
                    }
                    .into(),
                ])
            }
        })
        .emits(&["write"]),
    )?;

    let writer = Arc::clone(&llm);
    builder.add_step(
        StepFn::new("write", "write", move |ctx: RunContext<WriterState>, event| {
            let llm = Arc::clone(&writer);
            async move {
                let (attempt, feedback) = match event {
                    WriterEvent::Write { attempt, feedback } => (attempt, feedback),
                    other => return Err(unexpected_event("write", &other)),
                };
                ctx.update_state(|s| s.attempts = attempt);
                ctx.send_event(Notification::agent_run("writer", format!("Writing draft {attempt}")));

                let mut messages = ctx.with_memory(|m| m.with_system_prompt(WRITE_PROMPT));
                messages.push(Message::user(format!("Outline:\n{}", ctx.state().plan)));
                if let Some(feedback) = feedback {
                    messages.push(Message::user(format!("Reviewer feedback:\n{feedback}")));
                }
                let draft = complete(llm.as_ref(), &messages).await?;
                Ok(vec![WriterEvent::Review { attempt, draft }.into()])
            }
        })
        .emits(&["review"]),
    )?;

    builder.add_step(
        StepFn::new("review", "review", move |ctx: RunContext<WriterState>, event| {
            let reviewer = Arc::clone(&reviewer);
            async move {
                let (attempt, draft) = match event {
                    WriterEvent::Review { attempt, draft } => (attempt, draft),
                    other => return Err(unexpected_event("review", &other)),
                };
                let mut messages = ctx.with_memory(|m| m.with_system_prompt(REVIEW_PROMPT));
                messages.push(Message::user(format!("Draft to review:\n{draft}")));
                let decision: ReviewDecision =
                    generate_structured(reviewer.as_ref(), &messages, "review_decision").await?;

                if decision.approved {
                    ctx.send_event(Notification::agent_run("reviewer", "Draft approved"));
                    return Ok(vec![WriterEvent::Report { draft, approved: true }.into()]);
                }
                if attempt >= max_attempts {
                    tracing::warn!(attempts = attempt, "draft never approved, reporting the last one");
                    ctx.send_event(Notification::agent_run(
                        "reviewer",
                        format!("Stopped revising after {attempt} attempts; reporting the last draft"),
                    ));
                    return Ok(vec![WriterEvent::Report { draft, approved: false }.into()]);
                }
                ctx.send_event(Notification::agent_run(
                    "reviewer",
                    format!("Requested changes: {}", decision.feedback),
                ));
                Ok(vec![
                    WriterEvent::Write {
                        attempt: attempt + 1,
                        feedback: Some(decision.feedback),
                    }
                    .into(),
                ])
            }
        })
        .emits(&["write", "report"]),
    )?;

    builder.add_step(
        StepFn::new("report", "report", |ctx: RunContext<WriterState>, event| async move {
            let draft = match event {
                WriterEvent::Report { draft, .. } => draft,
                other => return Err(unexpected_event("report", &other)),
            };
            ctx.put(Message::assistant(draft.clone()));
            Ok(vec![StepOutput::Stop(StopSignal::text(draft))])
        })
        .emits(&[STOP]),
    )?;

    builder.set_start("start");
    builder.compile()
}
