mod common;

use std::sync::Arc;

use serde_json::json;

use relay_agent::prelude::*;
use relay_checkpoint::prelude::*;
use relay_core::message::Message;
use relay_core::mock::{ScriptedChatModel, ScriptedResponse};
use relay_graph::prelude::*;

use common::{RecordingTool, tool_messages};

struct Harness {
    llm: Arc<ScriptedChatModel>,
    extractor: Arc<RecordingTool>,
    filler: Arc<RecordingTool>,
    store: Arc<MemorySnapshotStore>,
    workflow: Workflow<FormFillEvent, FormFillState>,
}

fn harness(after_fill: &str) -> Harness {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::tool_calls([("fill", json!({"cell": "B2", "value": "42"}))]),
        ScriptedResponse::text(after_fill),
    ]));
    let extractor = RecordingTool::new("extract");
    let filler = RecordingTool::new("fill");
    let workflow = form_fill_workflow(FormFillConfig::new(llm.clone(), extractor.clone(), filler.clone())).unwrap();
    Harness {
        llm,
        extractor,
        filler,
        store: Arc::new(MemorySnapshotStore::new()),
        workflow,
    }
}

impl Harness {
    async fn pause(&self) -> PausedRun {
        let outcome = self
            .workflow
            .run(
                FormFillEvent::Input,
                ContextState::from_messages(vec![Message::user("Answer B2 with 42")]),
                RunOptions::new().with_store(self.store.clone()),
            )
            .collect_outcome()
            .await
            .unwrap();
        outcome.paused().cloned().expect("run should pause")
    }

    async fn answer(&self, request_id: &str, approved: bool, comment: Option<&str>) -> RunOutcome {
        let response = FormFillEvent::FillConfirmation {
            approved,
            comment: comment.map(str::to_string),
        };
        self.workflow
            .resume(request_id, vec![response], self.store.clone(), RunOptions::new())
            .await
            .unwrap()
            .collect_outcome()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn fill_waits_for_confirmation() {
    let h = harness("unused");
    let paused = h.pause().await;

    assert_eq!(paused.request.response_tag, FILL_CONFIRMATION);
    assert_eq!(paused.request.payload["message"], "Do you want to apply these changes?");
    assert_eq!(paused.request.payload["calls"][0]["name"], "fill");
    assert!(h.filler.inputs().is_empty());
    assert_eq!(h.llm.call_count(), 1);

    let stored = h.store.load(&paused.request_id).await.unwrap().expect("snapshot saved");
    assert_eq!(stored.workflow, "form_fill");
    assert_eq!(stored.context["state"]["pending_fill"][0]["input"]["cell"], "B2");
}

#[tokio::test]
async fn approved_fill_runs_the_filler() {
    let h = harness("B2 now says 42");
    let paused = h.pause().await;

    let outcome = h.answer(&paused.request_id, true, None).await;
    assert_eq!(outcome.text(), Some("B2 now says 42"));
    assert_eq!(h.filler.inputs(), vec![json!({"cell": "B2", "value": "42"})]);
    assert!(h.extractor.inputs().is_empty());

    let tools = tool_messages(&h.llm.requests()[1].messages);
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].0, "call_0");
    assert!(!tools[0].1);
    assert!(tools[0].2.starts_with("fill ok:"));

    // The snapshot is consumed by the resume.
    assert!(h.store.load(&paused.request_id).await.unwrap().is_none());
}

#[tokio::test]
async fn declined_fill_reports_the_comment() {
    let h = harness("Understood, leaving B2 alone");
    let paused = h.pause().await;

    let outcome = h.answer(&paused.request_id, false, Some("wrong cell")).await;
    assert_eq!(outcome.text(), Some("Understood, leaving B2 alone"));
    assert!(h.filler.inputs().is_empty());

    let tools = tool_messages(&h.llm.requests()[1].messages);
    assert_eq!(tools.len(), 1);
    assert!(tools[0].1);
    assert!(tools[0].2.contains("The user declined this change: wrong cell"));
}

#[tokio::test]
async fn inline_confirmation_behaves_like_resume() {
    let h = harness("Done");
    let outcome = h
        .workflow
        .run(
            FormFillEvent::Input,
            ContextState::from_messages(vec![Message::user("Answer B2 with 42")]),
            RunOptions::new().with_responder(|request: &PauseRequest| {
                assert_eq!(request.response_tag, FILL_CONFIRMATION);
                vec![FormFillEvent::FillConfirmation {
                    approved: true,
                    comment: None,
                }]
            }),
        )
        .collect_outcome()
        .await
        .unwrap();

    assert_eq!(outcome.text(), Some("Done"));
    assert_eq!(h.filler.inputs().len(), 1);
}

#[tokio::test]
async fn wrong_answer_type_is_rejected() {
    let h = harness("unused");
    let paused = h.pause().await;

    let err = h
        .workflow
        .resume(&paused.request_id, vec![FormFillEvent::Input], h.store.clone(), RunOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_resume_error());
    assert!(h.store.load(&paused.request_id).await.unwrap().is_some());
}
