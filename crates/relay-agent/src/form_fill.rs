//! Chat loop over an extractor tool and a filler tool.
//!
//! Extraction runs immediately. Filling pauses the run until a human
//! confirms the proposed change with a [`FormFillEvent::FillConfirmation`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use relay_core::error::Result;
use relay_core::message::ToolCall;
use relay_core::model::ChatModel;
use relay_core::tool::{Tool, ToolResult};
use relay_graph::builder::WorkflowBuilder;
use relay_graph::context::RunContext;
use relay_graph::event::{PauseRequest, STOP, StepOutput, StopSignal, WorkflowEvent};
use relay_graph::notification::Notification;
use relay_graph::step::{StepFn, unexpected_event};
use relay_graph::workflow::Workflow;

use crate::tool_calling::{call_tools, chat_with_tools, record_tool_turn, single_tool_violation};

const DEFAULT_PROMPT: &str = "You help users fill in spreadsheet forms. Use the extractor tool to \
find the questions that still need answers, and the filler tool to write answers back. Only \
call one kind of tool per turn.";

/// Response tag the run waits on after proposing a fill.
pub const FILL_CONFIRMATION: &str = "fill_confirmation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormFillEvent {
    Input,
    Extract { calls: Vec<ToolCall> },
    Fill { calls: Vec<ToolCall> },
    FillConfirmation {
        approved: bool,
        #[serde(default)]
        comment: Option<String>,
    },
}

impl WorkflowEvent for FormFillEvent {
    const TAGS: &'static [&'static str] = &["input", "extract", "fill", FILL_CONFIRMATION];

    fn tag(&self) -> &'static str {
        match self {
            FormFillEvent::Input => "input",
            FormFillEvent::Extract { .. } => "extract",
            FormFillEvent::Fill { .. } => "fill",
            FormFillEvent::FillConfirmation { .. } => FILL_CONFIRMATION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormFillState {
    /// Filler calls awaiting confirmation.
    pub pending_fill: Vec<ToolCall>,
}

#[derive(Clone)]
pub struct FormFillConfig {
    pub llm: Arc<dyn ChatModel>,
    pub extractor: Arc<dyn Tool>,
    pub filler: Arc<dyn Tool>,
    pub system_prompt: String,
}

impl FormFillConfig {
    pub fn new(llm: Arc<dyn ChatModel>, extractor: Arc<dyn Tool>, filler: Arc<dyn Tool>) -> Self {
        Self {
            llm,
            extractor,
            filler,
            system_prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

fn declined(calls: &[ToolCall], comment: Option<&str>) -> Vec<ToolResult> {
    let message = match comment {
        Some(comment) if !comment.trim().is_empty() => format!("The user declined this change: {comment}"),
        _ => "The user declined this change".to_string(),
    };
    calls
        .iter()
        .map(|call| ToolResult::error(&call.id, &call.name, message.clone()))
        .collect()
}

pub fn form_fill_workflow(config: FormFillConfig) -> Result<Workflow<FormFillEvent, FormFillState>> {
    let filler_name = config.filler.definition().name;
    let tools: Arc<Vec<Arc<dyn Tool>>> = Arc::new(vec![config.extractor, config.filler]);
    let llm = config.llm;
    let prompt: Arc<str> = config.system_prompt.into();

    let mut builder = WorkflowBuilder::<FormFillEvent, FormFillState>::new("form_fill");

    let chat_tools = Arc::clone(&tools);
    builder.add_step(
        StepFn::new("chat", "input", move |ctx: RunContext<FormFillState>, _event| {
            let llm = Arc::clone(&llm);
            let tools = Arc::clone(&chat_tools);
            let prompt = Arc::clone(&prompt);
            let filler_name = filler_name.clone();
            async move {
                let messages = ctx.with_memory(|m| m.with_system_prompt(&prompt));
                let response = chat_with_tools(llm.as_ref(), &tools, &messages).await?;

                if !response.has_tool_calls() {
                    let stream = response
                        .text_stream
                        .unwrap_or_else(|| Box::pin(futures::stream::empty()));
                    return Ok(vec![StepOutput::Stop(StopSignal::stream(stream))]);
                }
                if let Some(corrective) = single_tool_violation(&response.calls) {
                    ctx.put(corrective);
                    return Ok(vec![FormFillEvent::Input.into()]);
                }

                if let Some(message) = response.tool_call_message {
                    ctx.put(message);
                }
                let calls = response.calls;
                let next = if calls[0].name == filler_name {
                    FormFillEvent::Fill { calls }
                } else {
                    FormFillEvent::Extract { calls }
                };
                Ok(vec![next.into()])
            }
        })
        .emits(&["input", "extract", "fill", STOP]),
    )?;

    let extract_tools = Arc::clone(&tools);
    builder.add_step(
        StepFn::new("extract", "extract", move |ctx: RunContext<FormFillState>, event| {
            let tools = Arc::clone(&extract_tools);
            async move {
                let calls = match event {
                    FormFillEvent::Extract { calls } => calls,
                    other => return Err(unexpected_event("extract", &other)),
                };
                let results = call_tools(&ctx, &tools, &calls, "extractor").await?;
                record_tool_turn(&ctx, None, results);
                Ok(vec![FormFillEvent::Input.into()])
            }
        })
        .emits(&["input"]),
    )?;

    builder.add_step(
        StepFn::new("fill", "fill", |ctx: RunContext<FormFillState>, event| async move {
            let calls = match event {
                FormFillEvent::Fill { calls } => calls,
                other => return Err(unexpected_event("fill", &other)),
            };
            ctx.send_event(Notification::agent_run("filler", "Waiting for confirmation to fill the form"));
            let payload = json!({
                "message": "Do you want to apply these changes?",
                "calls": calls,
            });
            ctx.update_state(|s| s.pending_fill = calls);
            Ok(vec![StepOutput::Pause(PauseRequest::new(FILL_CONFIRMATION, payload))])
        })
        .awaits(FILL_CONFIRMATION),
    )?;

    let confirm_tools = Arc::clone(&tools);
    builder.add_step(
        StepFn::new("confirm", FILL_CONFIRMATION, move |ctx: RunContext<FormFillState>, event| {
            let tools = Arc::clone(&confirm_tools);
            async move {
                let (approved, comment) = match event {
                    FormFillEvent::FillConfirmation { approved, comment } => (approved, comment),
                    other => return Err(unexpected_event("confirm", &other)),
                };
                let calls = ctx.update_state(|s| std::mem::take(&mut s.pending_fill));
                let results = if approved {
                    call_tools(&ctx, &tools, &calls, "filler").await?
                } else {
                    tracing::info!(calls = calls.len(), "fill declined by user");
                    declined(&calls, comment.as_deref())
                };
                record_tool_turn(&ctx, None, results);
                Ok(vec![FormFillEvent::Input.into()])
            }
        })
        .emits(&["input"]),
    )?;

    builder.set_start("input");
    builder.compile()
}
