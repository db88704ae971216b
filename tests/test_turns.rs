//! Integration tests for turn orchestration
//!
//! Drives the orchestrator with scripted turns and checks what lands in the
//! Session Store and on the event channel.

mod common;

use agent_cowork::control::{ClientCommand, ServerEvent};
use agent_cowork::runtime::{ScriptStep, ScriptedTurn};
use agent_cowork::{PartialText, Role, SessionId, SessionStatus};
use common::{Harness, tool_results};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn streamed_deltas_commit_as_one_assistant_message() {
    let mut harness = Harness::new([ScriptedTurn::new().text_block(&["Hel", "lo"]).complete()]);
    let id = harness.start("Say hello");

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, Role::User);
    assert_eq!(session.messages[0].text(), "Say hello");
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert_eq!(session.messages[1].text(), "Hello");
    assert!(!session.messages[1].streaming);
    assert_eq!(session.title, "Say hello");

    let forwarded = harness
        .seen
        .iter()
        .filter(|event| matches!(event, ServerEvent::StreamMessage { .. }))
        .count();
    assert_eq!(forwarded, 4);

    let request = &harness.runtime.requests()[0];
    assert_eq!(request.prompt, "Say hello");
    assert!(request.history.is_empty());
    assert!(request.tools.iter().any(|tool| tool.name.as_str() == "Read"));
}

#[tokio::test(start_paused = true)]
async fn coalesced_flush_is_visible_mid_turn_and_clears_after_the_grace_delay() {
    let delta = |text: &str| {
        json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": text}
        })
    };
    let mut harness = Harness::new([ScriptedTurn::new()
        .stream(json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "text", "text": ""}
        }))
        .stream(delta("Part"))
        .stream(delta("ial"))
        .pause(Duration::from_secs(1))
        .stream(json!({"type": "content_block_stop", "index": 0}))
        .complete()]);
    let id = harness.start("go");
    let mut partial = harness.orchestrator.partial_text(&id).unwrap();

    // Both deltas land before the first frame deadline, so one flush carries both.
    partial
        .wait_for(|p| p.streaming && p.text == "Partial")
        .await
        .unwrap();
    let session = harness.orchestrator.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert_eq!(session.messages[1].text(), "Partial");
    assert!(session.messages[1].streaming);

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    assert_eq!(session.messages[1].text(), "Partial");
    assert!(!session.messages[1].streaming);
    assert_eq!(
        *partial.borrow(),
        PartialText {
            text: "Partial".into(),
            streaming: false,
        }
    );

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(*partial.borrow(), PartialText::default());
}

#[tokio::test]
async fn stream_messages_wrap_the_raw_event() {
    let mut harness = Harness::new([ScriptedTurn::new().text_block(&["x"]).complete()]);
    let id = harness.start("go");

    let message = harness
        .wait_for(|event| match event {
            ServerEvent::StreamMessage {
                session_id,
                message,
            } if session_id == &id => Some(message.clone()),
            _ => None,
        })
        .await;
    assert_eq!(message["type"], "stream_event");
    assert_eq!(message["event"]["type"], "content_block_start");
}

#[tokio::test]
async fn continuing_a_session_sends_its_history() {
    let mut harness = Harness::new([
        ScriptedTurn::new().text_block(&["first"]).complete(),
        ScriptedTurn::new().text_block(&["second"]).complete(),
    ]);
    let id = harness.start("one");
    harness.wait_for_status(&id, SessionStatus::Completed).await;

    harness
        .send(ClientCommand::SessionContinue {
            session_id: id.clone(),
            prompt: "two".into(),
        })
        .await;
    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;

    let texts: Vec<String> = session.messages.iter().map(|m| m.text()).collect();
    assert_eq!(texts, ["one", "first", "two", "second"]);
    let requests = harness.runtime.requests();
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].prompt, "two");
}

#[tokio::test]
async fn continuing_a_running_session_is_rejected() {
    let mut harness = Harness::new([ScriptedTurn::new().hold()]);
    let id = harness.start("long task");

    harness
        .send(ClientCommand::SessionContinue {
            session_id: id.clone(),
            prompt: "again".into(),
        })
        .await;
    let (message, session) = harness.wait_for_error().await;
    assert!(message.contains("already running"), "{message}");
    assert_eq!(session, Some(id.clone()));

    let snapshot = harness.orchestrator.session(&id).unwrap();
    assert_eq!(snapshot.status, SessionStatus::Running);
    assert_eq!(snapshot.messages.len(), 1);
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn stop_aborts_the_turn_and_keeps_the_session() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .text_block(&["Looking"])
        .stream(json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text"}}))
        .stream(json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "still"}}))
        .hold()]);
    let id = harness.start("investigate");
    harness
        .wait_for(|event| match event {
            ServerEvent::StreamMessage { message, .. }
                if message["event"]["delta"]["text"] == "still" =>
            {
                Some(())
            }
            _ => None,
        })
        .await;

    harness
        .send(ClientCommand::SessionStop {
            session_id: id.clone(),
        })
        .await;

    let session = harness.orchestrator.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Idle);
    assert!(!harness.orchestrator.is_running(&id));
    // Committed text survives the stop.
    assert!(session.messages[1].text().starts_with("Looking"));
    assert!(session.messages.iter().all(|message| !message.streaming));
    let partial = harness.orchestrator.partial_text(&id).unwrap();
    assert!(partial.borrow().text.is_empty());
}

#[tokio::test]
async fn runtime_failure_marks_the_session_as_errored() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .text_block(&["Partial answer"])
        .fail("model overloaded")]);
    let id = harness.start("question");

    let (message, session) = harness.wait_for_error().await;
    assert_eq!(message, "model overloaded");
    assert_eq!(session, Some(id.clone()));
    let snapshot = harness.wait_for_status(&id, SessionStatus::Error).await;
    assert_eq!(snapshot.messages[1].text(), "Partial answer");
}

#[tokio::test]
async fn runtime_errors_end_the_turn() {
    let mut harness = Harness::new([ScriptedTurn::new().step(ScriptStep::Error("pipe closed".into()))]);
    let id = harness.start("question");

    let (message, _) = harness.wait_for_error().await;
    assert!(message.contains("pipe closed"), "{message}");
    harness.wait_for_status(&id, SessionStatus::Error).await;
}

#[tokio::test]
async fn unknown_tools_fail_without_a_prompt() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use("c1", "Teleport", json!({"to": "mars"}))
        .await_replies(&["c1"])
        .complete()]);
    let id = harness.start("go");

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    let results = tool_results(&session);
    assert_eq!(results.len(), 1);
    assert!(!results[0].1.success);
    assert_eq!(results[0].1.error.as_deref(), Some("Unknown tool: Teleport"));
    assert_eq!(harness.permission_prompts(), 0);
    assert!(!harness.runtime.replies()[0].result.success);
}

#[tokio::test]
async fn commands_for_unknown_sessions_are_reported() {
    let mut harness = Harness::new([]);
    let ghost = SessionId::new("ghost");

    harness
        .send(ClientCommand::SessionContinue {
            session_id: ghost.clone(),
            prompt: "hi".into(),
        })
        .await;
    let (message, session) = harness.wait_for_error().await;
    assert_eq!(message, "Session not found: ghost");
    assert_eq!(session, Some(ghost.clone()));

    harness
        .send(ClientCommand::SessionStop { session_id: ghost })
        .await;
    let (message, _) = harness.wait_for_error().await;
    assert_eq!(message, "Session not found: ghost");
    assert!(harness.orchestrator.store().list().is_empty());
}
