//! Integration tests for the permission flow of tool calls

mod common;

use agent_cowork::control::{ClientCommand, ServerEvent};
use agent_cowork::runtime::ScriptedTurn;
use agent_cowork::{PermissionResult, Resolution, SessionStatus, ToolUseId};
use common::{Harness, tool_results};
use serde_json::json;

#[tokio::test]
async fn allowed_reads_stay_inside_the_working_directory() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use(
            "c1",
            "Read",
            json!({"explanation": "peek", "file_path": "../secret.txt"}),
        )
        .await_replies(&["c1"])
        .complete()]);
    std::fs::write(harness.root.path().join("secret.txt"), "top secret").unwrap();
    let id = harness.start("read the secret");

    let (call, tool) = harness.wait_for_permission().await;
    assert_eq!(call.as_str(), "c1");
    assert_eq!(tool, "Read");
    harness.respond(&id, &call, PermissionResult::allow_once()).await;

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    let results = tool_results(&session);
    assert_eq!(results.len(), 1);
    let error = results[0].1.error.clone().unwrap();
    assert!(
        error.starts_with("Access denied: Path is outside the working directory"),
        "{error}"
    );
    assert!(!results[0].1.text().contains("top secret"));
    assert_eq!(session.permission_requests[0].resolution, Resolution::AllowOnce);
}

#[tokio::test]
async fn permission_prompt_carries_arguments_and_capabilities() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use(
            "c1",
            "Write",
            json!({"explanation": "save", "file_path": "out.txt", "content": "hi"}),
        )
        .hold()]);
    let id = harness.start("write");

    let (arguments, capabilities) = harness
        .wait_for(|event| match event {
            ServerEvent::PermissionRequest {
                arguments,
                capabilities,
                ..
            } => Some((arguments.clone(), capabilities.clone())),
            _ => None,
        })
        .await;
    assert_eq!(arguments["file_path"], "out.txt");
    assert!(capabilities.iter().any(|c| c == "fs-write"), "{capabilities:?}");

    let pending = harness.orchestrator.session(&id).unwrap();
    assert_eq!(pending.pending_permissions().count(), 1);
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn allow_always_covers_later_calls_of_the_same_tool() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use("c1", "Read", json!({"explanation": "a", "file_path": "notes.txt"}))
        .tool_use("c2", "Read", json!({"explanation": "b", "file_path": "notes.txt"}))
        .await_replies(&["c1", "c2"])
        .complete()]);
    std::fs::write(harness.workdir().join("notes.txt"), "remember the milk").unwrap();
    let id = harness.start("read twice");

    let (call, _) = harness.wait_for_permission().await;
    harness
        .respond(&id, &call, PermissionResult::allow_always())
        .await;

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    assert_eq!(harness.permission_prompts(), 1);
    assert_eq!(session.permission_requests.len(), 1);
    assert!(session.always_allowed.iter().any(|tool| tool.as_str() == "Read"));

    let results = tool_results(&session);
    assert_eq!(results.len(), 2);
    for (_, result) in &results {
        assert!(result.success, "{result:?}");
        assert_eq!(result.text(), "remember the milk");
    }
}

#[tokio::test]
async fn denied_calls_never_execute() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use(
            "c1",
            "Write",
            json!({"explanation": "save", "file_path": "out.txt", "content": "hi"}),
        )
        .await_replies(&["c1"])
        .complete()]);
    let id = harness.start("write a file");

    let (call, _) = harness.wait_for_permission().await;
    harness.respond(&id, &call, PermissionResult::deny()).await;

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    let results = tool_results(&session);
    assert!(!results[0].1.success);
    assert_eq!(results[0].1.error.as_deref(), Some("Permission denied by user"));
    assert!(!harness.workdir().join("out.txt").exists());
    assert_eq!(session.permission_requests[0].resolution, Resolution::Deny);
}

#[tokio::test]
async fn a_request_is_resolved_at_most_once() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use("c1", "AskUserQuestion", json!({"question": "Proceed?"}))
        .await_replies(&["c1"])
        .complete()]);
    let id = harness.start("ask me");

    let (call, _) = harness.wait_for_permission().await;
    harness.respond(&id, &call, PermissionResult::allow_once()).await;
    harness.respond(&id, &call, PermissionResult::deny()).await;

    let (message, session) = harness.wait_for_error().await;
    assert!(message.contains("already resolved"), "{message}");
    assert_eq!(session, Some(id.clone()));
    let snapshot = harness.orchestrator.session(&id).unwrap();
    assert_eq!(snapshot.permission_requests[0].resolution, Resolution::AllowOnce);
}

#[tokio::test]
async fn responses_for_unknown_calls_are_rejected() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use("c1", "AskUserQuestion", json!({"question": "Proceed?"}))
        .hold()]);
    let id = harness.start("ask me");
    harness.wait_for_permission().await;

    harness
        .respond(&id, &ToolUseId::new("c9"), PermissionResult::allow_once())
        .await;
    let (message, _) = harness.wait_for_error().await;
    assert!(message.contains("c9"), "{message}");

    let snapshot = harness.orchestrator.session(&id).unwrap();
    assert_eq!(snapshot.permission_requests.len(), 1);
    assert!(snapshot.permission_requests[0].resolution.is_pending());
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn deleting_a_session_cancels_every_pending_request() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use("c1", "Read", json!({"explanation": "a", "file_path": "a.txt"}))
        .tool_use(
            "c2",
            "Write",
            json!({"explanation": "b", "file_path": "b.txt", "content": "x"}),
        )
        .tool_use("c3", "AskUserQuestion", json!({"question": "Sure?"}))
        .await_replies(&["c1", "c2", "c3"])
        .complete()]);
    let id = harness.start("do three things");
    for _ in 0..3 {
        harness.wait_for_permission().await;
    }

    let deleted = harness.orchestrator.delete_session(&id).await.unwrap();
    assert_eq!(deleted.permission_requests.len(), 3);
    assert!(
        deleted
            .permission_requests
            .iter()
            .all(|request| request.resolution == Resolution::Cancelled)
    );
    assert!(harness.orchestrator.session(&id).is_err());
    assert_eq!(harness.orchestrator.store().list().len(), 0);

    harness
        .wait_for(|event| match event {
            ServerEvent::SessionDeleted { session_id } if session_id == &id => Some(()),
            _ => None,
        })
        .await;
    assert!(!harness.workdir().join("b.txt").exists());
}

#[tokio::test]
async fn answers_travel_in_the_updated_input() {
    let mut harness = Harness::new([ScriptedTurn::new()
        .tool_use("c1", "AskUserQuestion", json!({"question": "Which db?"}))
        .await_replies(&["c1"])
        .complete()]);
    let id = harness.start("set up storage");

    let (call, _) = harness.wait_for_permission().await;
    harness
        .send(ClientCommand::PermissionResponse {
            session_id: id.clone(),
            tool_use_id: call,
            result: PermissionResult::Allow {
                updated_input: Some(json!({"question": "Which db?", "answer": "Postgres"})),
                scope: Default::default(),
            },
        })
        .await;

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    let results = tool_results(&session);
    assert_eq!(results[0].1.text(), "Question: Which db?\nAnswer: Postgres");
    let replies = harness.runtime.replies();
    assert_eq!(replies[0].result.text(), "Question: Which db?\nAnswer: Postgres");
}
