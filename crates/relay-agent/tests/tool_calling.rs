mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use relay_agent::prelude::*;
use relay_core::message::{Message, Role};
use relay_core::mock::{ScriptedChatModel, ScriptedResponse};
use relay_core::tool::Tool;
use relay_graph::prelude::*;

use common::{BlockingTool, RecordingTool, count_role, tool_messages};

fn form_fill(llm: Arc<ScriptedChatModel>, extractor: Arc<dyn Tool>, filler: Arc<dyn Tool>) -> Workflow<FormFillEvent, FormFillState> {
    form_fill_workflow(FormFillConfig::new(llm, extractor, filler)).unwrap()
}

fn request() -> ContextState<FormFillState> {
    ContextState::from_messages(vec![Message::user("Please fill in my questionnaire")])
}

#[tokio::test]
async fn same_tool_calls_run_in_order_with_progress() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::tool_calls([
            ("extract", json!({"sheet": 1})),
            ("extract", json!({"sheet": 2})),
            ("extract", json!({"sheet": 3})),
        ]),
        ScriptedResponse::text("Found all the questions"),
    ]));
    let extractor = RecordingTool::new("extract");
    let filler = RecordingTool::new("fill");

    let outcome = form_fill(llm.clone(), extractor.clone(), filler.clone())
        .run(FormFillEvent::Input, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("Found all the questions"));

    let progress: Vec<&Progress> = outcome.notifications().iter().filter_map(|n| n.progress()).collect();
    assert_eq!(progress.len(), 3);
    assert_eq!(progress.iter().map(|p| p.current).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(progress.iter().all(|p| p.total == 3 && p.id == progress[0].id));

    assert_eq!(
        extractor.inputs(),
        vec![json!({"sheet": 1}), json!({"sheet": 2}), json!({"sheet": 3})]
    );
    assert!(filler.inputs().is_empty());

    let second_turn = &llm.requests()[1].messages;
    let tools = tool_messages(second_turn);
    assert_eq!(
        tools.iter().map(|(id, _, _)| id.as_str()).collect::<Vec<_>>(),
        vec!["call_0", "call_1", "call_2"]
    );
    assert!(tools.iter().all(|(_, is_error, _)| !is_error));
    // The assistant turn carrying the calls precedes its results.
    let assistant = second_turn.iter().rev().find(|m| m.role() == Role::Assistant).unwrap();
    assert_eq!(assistant.tool_calls().len(), 3);
}

#[tokio::test]
async fn plain_answer_records_no_tool_results() {
    let llm = Arc::new(ScriptedChatModel::with_response("Nothing to fill"));
    let extractor = RecordingTool::new("extract");
    let filler = RecordingTool::new("fill");

    let outcome = form_fill(llm.clone(), extractor.clone(), filler)
        .run(FormFillEvent::Input, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("Nothing to fill"));
    assert!(outcome.notifications().is_empty());
    assert!(extractor.inputs().is_empty());
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn mixed_tools_are_never_executed() {
    let mixed = || ScriptedResponse::tool_calls([("extract", json!({})), ("fill", json!({"cell": "A1"}))]);
    let llm = Arc::new(ScriptedChatModel::new(vec![
        mixed(),
        mixed(),
        ScriptedResponse::text("Let me do one thing at a time"),
    ]));
    let extractor = RecordingTool::new("extract");
    let filler = RecordingTool::new("fill");

    let outcome = form_fill(llm.clone(), extractor.clone(), filler.clone())
        .run(FormFillEvent::Input, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("Let me do one thing at a time"));
    assert!(extractor.inputs().is_empty());
    assert!(filler.inputs().is_empty());

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    // One corrective entry per mixed turn, nothing else.
    assert_eq!(count_role(&requests[1].messages, Role::Assistant), 1);
    assert_eq!(count_role(&requests[2].messages, Role::Assistant), 2);
    assert_eq!(count_role(&requests[2].messages, Role::Tool), 0);
    let corrective = requests[2].messages.last().unwrap();
    assert!(corrective.content().contains("extract, fill"));
    assert!(corrective.tool_calls().is_empty());
}

#[tokio::test]
async fn failing_tool_becomes_error_result() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::tool_calls([("extract", json!({"sheet": 1}))]),
        ScriptedResponse::text("The sheet is locked"),
    ]));
    let extractor = RecordingTool::failing("extract", "sheet locked");
    let filler = RecordingTool::new("fill");

    let outcome = form_fill(llm.clone(), extractor, filler)
        .run(FormFillEvent::Input, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("The sheet is locked"));
    // A single call reports plain commentary, not progress.
    assert_eq!(outcome.notifications().len(), 1);
    assert!(outcome.notifications()[0].progress().is_none());

    let tools = tool_messages(&llm.requests()[1].messages);
    assert_eq!(tools.len(), 1);
    let (id, is_error, content) = &tools[0];
    assert_eq!(id, "call_0");
    assert!(*is_error);
    let payload: serde_json::Value = serde_json::from_str(content).unwrap();
    assert_eq!(payload["is_error"], true);
    assert_eq!(payload["tool"], "extract");
    assert!(payload["message"].as_str().unwrap().contains("sheet locked"));
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedResponse::tool_calls([("shred", json!({}))]),
        ScriptedResponse::text("I cannot do that"),
    ]));
    let outcome = form_fill(llm.clone(), RecordingTool::new("extract"), RecordingTool::new("fill"))
        .run(FormFillEvent::Input, request(), RunOptions::new())
        .collect_outcome()
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("I cannot do that"));
    let tools = tool_messages(&llm.requests()[1].messages);
    assert!(tools[0].1);
    assert!(tools[0].2.contains("Tool not found: shred"));
}

#[tokio::test]
async fn cancellation_abandons_in_flight_tool() {
    let llm = Arc::new(ScriptedChatModel::new(vec![ScriptedResponse::tool_calls([(
        "extract",
        json!({}),
    )])]));
    let extractor = BlockingTool::new("extract");

    let handler = form_fill(llm.clone(), extractor.clone(), RecordingTool::new("fill")).run(
        FormFillEvent::Input,
        request(),
        RunOptions::new(),
    );
    let token = handler.cancellation_token();
    let (mut chunks, _side) = bridge(handler);

    let waiter = {
        let extractor = Arc::clone(&extractor);
        tokio::spawn(async move {
            extractor.started.notified().await;
            token.cancel();
        })
    };

    let err = chunks.next().await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(chunks.next().await.is_none());
    assert!(extractor.was_abandoned());
    assert_eq!(llm.call_count(), 1);
    waiter.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_answer_stops_chunks() {
    let llm = Arc::new(
        ScriptedChatModel::with_response("one two three four").with_chunk_delay(Duration::from_millis(10)),
    );
    let handler = form_fill(llm, RecordingTool::new("extract"), RecordingTool::new("fill")).run(
        FormFillEvent::Input,
        request(),
        RunOptions::new(),
    );
    let token = handler.cancellation_token();
    let (mut chunks, side) = bridge(handler);

    assert_eq!(chunks.next().await.unwrap().unwrap(), "one ");
    token.cancel();
    assert!(chunks.next().await.unwrap().unwrap_err().is_cancelled());
    assert!(chunks.next().await.is_none());
    assert!(side.is_closed());
}
