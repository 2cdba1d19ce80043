use std::sync::Arc;

use serde_json::json;

use relay_agent::prelude::*;
use relay_core::error::{GraphError, RelayError};
use relay_core::message::Message;
use relay_core::mock::{ScriptedChatModel, ScriptedResponse};
use relay_graph::prelude::*;

fn verdict(approved: bool, feedback: &str) -> ScriptedResponse {
    ScriptedResponse::text(json!({ "approved": approved, "feedback": feedback }).to_string())
}

fn request() -> ContextState<WriterState> {
    ContextState::from_messages(vec![Message::user("Write a note about tide pools")])
}

fn texts(outcome: &RunOutcome) -> Vec<String> {
    outcome
        .notifications()
        .iter()
        .filter_map(|n| match n {
            Notification::AgentRun { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn rejected_drafts_stop_at_the_attempt_limit() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::text("1. Intro\n2. Life"),
        ScriptedResponse::text("draft one"),
        ScriptedResponse::text("draft two"),
    ]));
    let reviewer = Arc::new(ScriptedChatModel::new(vec![]).with_fallback(verdict(false, "needs more detail")));
    let workflow = writer_workflow(
        WriterConfig::new(llm.clone())
            .with_reviewer(reviewer.clone())
            .with_max_attempts(2),
    )
    .unwrap();

    let outcome = workflow
        .run(WriterEvent::Start, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();

    assert_eq!(outcome.text(), Some("draft two"));
    assert_eq!(reviewer.call_count(), 2);
    // One plan call plus two drafts.
    assert_eq!(llm.call_count(), 3);

    let texts = texts(&outcome);
    assert!(texts.contains(&"Writing draft 1".to_string()));
    assert!(texts.contains(&"Writing draft 2".to_string()));
    assert!(!texts.contains(&"Writing draft 3".to_string()));
    assert_eq!(
        texts.last().map(String::as_str),
        Some("Stopped revising after 2 attempts; reporting the last draft")
    );

    // The second draft was written with the reviewer's feedback in view.
    let second_draft = &llm.requests()[2].messages;
    assert!(second_draft.iter().any(|m| m.content() == "Reviewer feedback:\nneeds more detail"));
    assert!(second_draft.iter().any(|m| m.content().starts_with("Outline:\n1. Intro")));
}

#[tokio::test]
async fn approval_on_second_attempt_reports_that_draft() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::text("outline"),
        ScriptedResponse::text("rough"),
        ScriptedResponse::text("polished"),
    ]));
    let reviewer = Arc::new(ScriptedChatModel::new(vec![
        verdict(false, "tighten the intro"),
        verdict(true, ""),
    ]));
    let workflow = writer_workflow(WriterConfig::new(llm.clone()).with_reviewer(reviewer.clone())).unwrap();

    let outcome = workflow
        .run(WriterEvent::Start, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();

    assert_eq!(outcome.text(), Some("polished"));
    assert_eq!(reviewer.call_count(), 2);
    let texts = texts(&outcome);
    assert_eq!(
        texts,
        vec![
            "Outlined the document",
            "Writing draft 1",
            "Requested changes: tighten the intro",
            "Writing draft 2",
            "Draft approved",
        ]
    );
}

#[tokio::test]
async fn reviewer_sees_the_draft() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::text("outline"),
        ScriptedResponse::text("the only draft"),
    ]));
    let reviewer = Arc::new(ScriptedChatModel::new(vec![verdict(true, "fine")]));
    let workflow = writer_workflow(WriterConfig::new(llm).with_reviewer(reviewer.clone())).unwrap();

    workflow
        .run(WriterEvent::Start, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();

    let review = &reviewer.requests()[0];
    assert_eq!(
        review.messages.last().map(|m| m.content()),
        Some("Draft to review:\nthe only draft")
    );
    assert!(review.options.response_format.is_some());
}

#[tokio::test]
async fn malformed_review_fails_the_run() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::text("outline"),
        ScriptedResponse::text("draft"),
    ]));
    let reviewer = Arc::new(ScriptedChatModel::with_response("Looks great to me!"));
    let workflow = writer_workflow(WriterConfig::new(llm).with_reviewer(reviewer)).unwrap();

    let err = workflow
        .run(WriterEvent::Start, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap_err();

    match err {
        RelayError::Graph(GraphError::StepExecution { step, source }) => {
            assert_eq!(step, "review");
            assert_eq!(source.kind(), "malformed_output");
        }
        other => panic!("unexpected error: {other}"),
    }
}
