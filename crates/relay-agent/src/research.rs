//! Retrieve → plan → answer×N → collect → plan … → report.
//!
//! The planner decides each round whether more research is needed. Its
//! questions fan out as separate events and are collected back in question
//! order before the planner runs again.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use relay_core::error::Result;
use relay_core::message::{Message, Role};
use relay_core::model::{CallOptions, ChatModel};
use relay_core::retriever::{Retriever, format_context};
use relay_core::structured::generate_structured;
use relay_graph::builder::WorkflowBuilder;
use relay_graph::context::RunContext;
use relay_graph::event::{STOP, StepOutput, StopSignal, WorkflowEvent};
use relay_graph::notification::{Notification, Progress};
use relay_graph::step::{StepFn, unexpected_event};
use relay_graph::workflow::Workflow;

use crate::suggestion::suggest_next_questions;
use crate::tool_calling::stream_text;

const PLAN_PROMPT: &str = "You are a research planner. Using the context and the findings so far, \
decide whether more questions must be researched before writing the answer. Reply with JSON only: \
{\"decision\": \"research\" | \"write\" | \"cancel\", \"questions\": [string], \"reason\": string | null}.";

const ANSWER_PROMPT: &str = "Answer the research question using only the context below. \
Be concise and cite the context numbers you used.";

const REPORT_PROMPT: &str = "Write the final answer to the user's request from the research \
findings below.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    Start,
    Plan,
    Question { index: usize, question: String },
    Answer { index: usize, question: String, answer: String },
    Report,
}

impl WorkflowEvent for ResearchEvent {
    const TAGS: &'static [&'static str] = &["start", "plan", "question", "answer", "report"];

    fn tag(&self) -> &'static str {
        match self {
            ResearchEvent::Start => "start",
            ResearchEvent::Plan => "plan",
            ResearchEvent::Question { .. } => "question",
            ResearchEvent::Answer { .. } => "answer",
            ResearchEvent::Report => "report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub index: usize,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    pub context: String,
    pub rounds: u32,
    /// Answers still outstanding in the current round.
    pub expected: usize,
    pub pending: Vec<Finding>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanDecision {
    Research,
    Write,
    Cancel,
}

/// Structured decision returned by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchPlan {
    pub decision: PlanDecision,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct ResearchConfig {
    pub llm: Arc<dyn ChatModel>,
    pub retriever: Arc<dyn Retriever>,
    pub max_rounds: u32,
    pub max_questions: usize,
    pub suggest_follow_ups: bool,
}

impl ResearchConfig {
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            llm,
            retriever,
            max_rounds: 3,
            max_questions: 5,
            suggest_follow_ups: false,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions.max(1);
        self
    }

    pub fn with_follow_ups(mut self) -> Self {
        self.suggest_follow_ups = true;
        self
    }
}

fn render_findings(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "(none yet)".to_string();
    }
    findings
        .iter()
        .map(|f| format!("Q: {}\nA: {}", f.question, f.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn latest_request(ctx: &RunContext<ResearchState>) -> String {
    ctx.with_memory(|m| {
        m.get_messages()
            .iter()
            .rev()
            .find(|msg| msg.role() == Role::User)
            .map(|msg| msg.content().to_string())
            .unwrap_or_default()
    })
}

pub fn research_workflow(config: ResearchConfig) -> Result<Workflow<ResearchEvent, ResearchState>> {
    let ResearchConfig {
        llm,
        retriever,
        max_rounds,
        max_questions,
        suggest_follow_ups,
    } = config;

    let mut builder = WorkflowBuilder::<ResearchEvent, ResearchState>::new("research");

    builder.add_step(
        StepFn::new("retrieve", "start", move |ctx: RunContext<ResearchState>, _event| {
            let retriever = Arc::clone(&retriever);
            async move {
                let query = latest_request(&ctx);
                let nodes = retriever.retrieve(&query).await?;
                tracing::debug!(nodes = nodes.len(), "retrieved research context");
                let context = format_context(&nodes);
                ctx.update_state(|s| s.context = context);
                ctx.send_event(Notification::sources(nodes));
                Ok(vec![ResearchEvent::Plan.into()])
            }
        })
        .emits(&["plan"]),
    )?;

    let planner = Arc::clone(&llm);
    builder.add_step(
        StepFn::new("plan", "plan", move |ctx: RunContext<ResearchState>, _event| {
            let llm = Arc::clone(&planner);
            async move {
                let rounds = ctx.update_state(|s| {
                    s.rounds += 1;
                    s.rounds
                });
                if rounds > max_rounds {
                    tracing::warn!(rounds = max_rounds, "research round limit reached");
                    ctx.send_event(Notification::agent_run(
                        "researcher",
                        format!("Stopped researching after {max_rounds} rounds"),
                    ));
                    return Ok(vec![ResearchEvent::Report.into()]);
                }

                let state = ctx.state();
                let mut messages = ctx.with_memory(|m| m.with_system_prompt(PLAN_PROMPT));
                messages.push(Message::user(format!(
                    "Context:\n{}\n\nFindings so far:\n{}",
                    state.context,
                    render_findings(&state.findings)
                )));
                let plan: ResearchPlan = generate_structured(llm.as_ref(), &messages, "research_plan").await?;

                match plan.decision {
                    PlanDecision::Cancel => {
                        let reason = plan
                            .reason
                            .unwrap_or_else(|| "The request cannot be answered from the available sources.".into());
                        ctx.put(Message::assistant(reason.clone()));
                        Ok(vec![StepOutput::Stop(StopSignal::text(reason))])
                    }
                    PlanDecision::Research if !plan.questions.is_empty() => {
                        let mut questions = plan.questions;
                        questions.truncate(max_questions);
                        let n = questions.len();
                        ctx.update_state(|s| {
                            s.expected = n;
                            s.pending.clear();
                        });
                        ctx.send_event(Notification::agent_run(
                            "researcher",
                            format!("Researching {n} questions"),
                        ));
                        Ok(questions
                            .into_iter()
                            .enumerate()
                            .map(|(index, question)| StepOutput::Event(ResearchEvent::Question { index, question }))
                            .collect())
                    }
                    PlanDecision::Research | PlanDecision::Write => Ok(vec![ResearchEvent::Report.into()]),
                }
            }
        })
        .emits(&["question", "report", STOP]),
    )?;

    let answerer = Arc::clone(&llm);
    builder.add_step(
        StepFn::new("answer", "question", move |ctx: RunContext<ResearchState>, event| {
            let llm = Arc::clone(&answerer);
            async move {
                let (index, question) = match event {
                    ResearchEvent::Question { index, question } => (index, question),
                    other => return Err(unexpected_event("answer", &other)),
                };
                let state = ctx.state();
                ctx.send_event(Notification::agent_progress(
                    "researcher",
                    format!("Answering: {question}"),
                    Progress {
                        id: format!("{}-round-{}", ctx.run_id(), state.rounds),
                        total: state.expected,
                        current: index,
                    },
                ));
                let messages = vec![
                    Message::system(format!("{ANSWER_PROMPT}\n\nContext:\n{}", state.context)),
                    Message::user(question.clone()),
                ];
                let result = llm.generate(&messages, &CallOptions::default()).await?;
                Ok(vec![
                    ResearchEvent::Answer {
                        index,
                        question,
                        answer: result.message.content().to_string(),
                    }
                    .into(),
                ])
            }
        })
        .emits(&["answer"]),
    )?;

    builder.add_step(
        StepFn::new("collect", "answer", |ctx: RunContext<ResearchState>, event| async move {
            let (index, question, answer) = match event {
                ResearchEvent::Answer { index, question, answer } => (index, question, answer),
                other => return Err(unexpected_event("collect", &other)),
            };
            let complete = ctx.update_state(|s| {
                s.pending.push(Finding { index, question, answer });
                if s.pending.len() < s.expected {
                    return false;
                }
                let mut round = std::mem::take(&mut s.pending);
                round.sort_by_key(|f| f.index);
                s.findings.extend(round);
                s.expected = 0;
                true
            });
            Ok(if complete { vec![ResearchEvent::Plan.into()] } else { vec![] })
        })
        .emits(&["plan"]),
    )?;

    let reporter = Arc::clone(&llm);
    builder.add_step(
        StepFn::new("report", "report", move |ctx: RunContext<ResearchState>, _event| {
            let llm = Arc::clone(&reporter);
            async move {
                let state = ctx.state();
                let history = ctx.messages();
                let mut messages = ctx.with_memory(|m| {
                    m.with_system_prompt(&format!(
                        "{REPORT_PROMPT}\n\nContext:\n{}\n\nFindings:\n{}",
                        state.context,
                        render_findings(&state.findings)
                    ))
                });
                if !matches!(messages.last().map(Message::role), Some(Role::User)) {
                    messages.push(Message::user("Write the answer now."));
                }
                let stream = stream_text(llm.as_ref(), &messages).await?;
                let mut signal = StopSignal::stream(stream);
                if suggest_follow_ups {
                    signal = signal.with_completion(suggest_next_questions(Arc::clone(&llm), history));
                }
                Ok(vec![StepOutput::Stop(signal)])
            }
        })
        .emits(&[STOP]),
    )?;

    builder.set_start("start");
    builder.compile()
}
