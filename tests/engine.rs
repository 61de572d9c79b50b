//! Interaction engine and tool dispatch integration tests

use heddy::backend::{ContentPart, RunEvent};
use heddy::{Error, EventKind, OutcomeStatus, TurnPhase, UserContent};

mod common;

use common::{BackendCall, Harness, THREAD_ID, ZAPIER_URL, reply, text_message_calls};

#[tokio::test]
async fn test_snapshot_and_text_share_one_message() {
    let harness = Harness::new(&[], &[]);
    harness.backend.push_run(reply(&["It's a cat."]));
    let engine = harness.engine();

    let content = UserContent::text("describe this").with_image(Some("file-abc".into()));
    engine.interact(&content).await.unwrap();

    let appended = harness.backend.appended();
    assert_eq!(appended.len(), 1, "text and image go in a single message");

    let parts = &appended[0];
    assert_eq!(parts.len(), 2);
    assert!(matches!(&parts[0], ContentPart::Text { text } if text == "describe this"));
    assert!(matches!(
        &parts[1],
        ContentPart::ImageFile { image_file } if image_file.file_id == "file-abc"
    ));
}

#[tokio::test]
async fn test_completed_run_returns_fragments_in_order() {
    let harness = Harness::new(&[], &[]);
    harness.backend.push_run(reply(&["The ", "lights ", "are ", "on."]));
    let engine = harness.engine();

    let outcome = engine.interact(&UserContent::text("status")).await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.response, "The lights are on.");
    assert!(outcome.pending_action.is_none());
    assert!(!harness.session.is_in_progress());
    assert_eq!(
        harness.backend.calls(),
        vec![
            BackendCall::CreateThread,
            BackendCall::AppendMessage {
                thread_id: THREAD_ID.into(),
                parts: UserContent::text("status").to_parts(),
            },
            BackendCall::StartStream {
                thread_id: THREAD_ID.into(),
                assistant_id: common::ASSISTANT_ID.into(),
            },
        ]
    );
}

#[tokio::test]
async fn test_thread_is_reused_across_turns() {
    let harness = Harness::new(&[], &[]);
    harness.backend.push_run(reply(&["one"]));
    harness.backend.push_run(reply(&["two"]));
    let engine = harness.engine();

    engine.interact(&UserContent::text("a")).await.unwrap();
    engine.interact(&UserContent::text("b")).await.unwrap();

    let created = harness
        .backend
        .calls()
        .iter()
        .filter(|c| **c == BackendCall::CreateThread)
        .count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_failed_run_is_an_error_outcome() {
    let harness = Harness::new(&[], &[]);
    harness.backend.push_run(vec![
        RunEvent::TextDelta("partial".into()),
        RunEvent::Failed("rate limit exceeded".into()),
    ]);
    let engine = harness.engine();

    let outcome = engine.interact(&UserContent::text("hi")).await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert_eq!(outcome.error.as_deref(), Some("rate limit exceeded"));
    assert!(!harness.session.is_in_progress());
}

#[tokio::test]
async fn test_stream_without_terminal_event_is_an_error_outcome() {
    let harness = Harness::new(&[], &[]);
    harness
        .backend
        .push_run(vec![RunEvent::TextDelta("cut off".into())]);
    let engine = harness.engine();

    let outcome = engine.interact(&UserContent::text("hi")).await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert!(!harness.session.is_in_progress());
}

#[tokio::test]
async fn test_action_required_keeps_session_busy() {
    let harness = Harness::new(&[], &[]);
    harness
        .backend
        .push_run(text_message_calls("run_1", &["turn on the lights"]));
    let engine = harness.engine();

    let outcome = engine
        .interact(&UserContent::text("turn on the lights"))
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::ActionRequired);
    let action = outcome.pending_action.unwrap();
    assert_eq!(action.run_id, "run_1");
    assert_eq!(action.thread_id, THREAD_ID);
    assert_eq!(action.calls.len(), 1);
    assert_eq!(action.calls[0].kind, EventKind::Zapier);
    assert_eq!(action.calls[0].call_id, "call_1");
    assert_eq!(
        action.calls[0].arguments["message"],
        serde_json::json!("turn on the lights")
    );
    assert!(action.calls[0].output.is_none());
    assert!(harness.session.is_in_progress());
}

#[tokio::test]
async fn test_resume_submits_outputs_and_completes() {
    let harness = Harness::new(&[], &[]);
    harness
        .backend
        .push_run(text_message_calls("run_1", &["turn on the lights"]));
    harness.backend.push_run(reply(&["Done."]));
    let engine = harness.engine();
    let tools = harness.tools();

    let outcome = engine
        .interact(&UserContent::text("turn on the lights"))
        .await
        .unwrap();
    let resolved = tools
        .dispatch_batch(&outcome.pending_action.unwrap())
        .await
        .unwrap();
    let resumed = engine.resume(&resolved).await.unwrap();

    assert_eq!(resumed.status, OutcomeStatus::Success);
    assert_eq!(resumed.response, "Done.");
    assert!(!harness.session.is_in_progress());

    let submitted = harness.backend.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0][0].tool_call_id, "call_1");
    assert_eq!(submitted[0][0].output, "Success!");

    assert_eq!(
        harness.webhook.posts(),
        vec![(
            ZAPIER_URL.to_string(),
            serde_json::json!({"text": "turn on the lights"})
        )]
    );
}

#[tokio::test]
async fn test_phase_follows_turn_lifecycle() {
    let harness = Harness::new(&[], &[]);
    harness.backend.push_run(reply(&["hi"]));
    harness
        .backend
        .push_run(text_message_calls("run_1", &["turn on the lights"]));
    harness.backend.push_run(vec![RunEvent::Failed("server_error".into())]);
    harness
        .backend
        .push_run(text_message_calls("run_2", &["lock the door"]));
    let engine = harness.engine();
    assert_eq!(engine.phase(), TurnPhase::Idle);

    engine.interact(&UserContent::text("hello")).await.unwrap();
    assert_eq!(engine.phase(), TurnPhase::Completed);

    let paused = engine.interact(&UserContent::text("lights")).await.unwrap();
    assert_eq!(engine.phase(), TurnPhase::ActionRequired);

    // The run fails after the tool outputs go in
    let resolved = harness
        .tools()
        .dispatch_batch(&paused.pending_action.unwrap())
        .await
        .unwrap();
    let resumed = engine.resume(&resolved).await.unwrap();
    assert_eq!(resumed.status, OutcomeStatus::Error);
    assert_eq!(engine.phase(), TurnPhase::Failed);

    engine.interact(&UserContent::text("door")).await.unwrap();
    assert_eq!(engine.phase(), TurnPhase::ActionRequired);
    engine.abandon();
    assert_eq!(engine.phase(), TurnPhase::Failed);
    assert!(!harness.session.is_in_progress());
}

#[tokio::test]
async fn test_unknown_function_fails_the_turn() {
    let harness = Harness::new(&[], &[]);
    let mut events = text_message_calls("run_1", &["x"]);
    if let Some(RunEvent::RequiresAction(action)) = events.last_mut() {
        action.calls[0].name = "order_pizza".into();
    }
    harness.backend.push_run(events);
    let engine = harness.engine();

    let result = engine.interact(&UserContent::text("pizza")).await;

    assert!(matches!(
        result,
        Err(Error::UnsupportedToolFunction(name)) if name == "order_pizza"
    ));
    assert!(!harness.session.is_in_progress());
}

#[tokio::test]
async fn test_resume_without_paused_turn_is_rejected() {
    let harness = Harness::new(&[], &[]);
    let engine = harness.engine();

    let action = heddy::PendingAction {
        run_id: "run_9".into(),
        thread_id: THREAD_ID.into(),
        calls: Vec::new(),
    };

    let result = engine.resume(&action).await;

    assert!(matches!(result, Err(Error::SessionExpiredDuringTurn)));
    assert!(harness.backend.submitted().is_empty());
}

#[tokio::test]
async fn test_dispatch_batch_is_all_or_nothing() {
    let harness = Harness::new(&[], &[]);
    harness.backend.push_run(text_message_calls(
        "run_1",
        &["first", "second", "third"],
    ));
    harness.webhook.respond_with(&[200, 500, 200]);
    let engine = harness.engine();
    let tools = harness.tools();

    let outcome = engine.interact(&UserContent::text("go")).await.unwrap();
    let action = outcome.pending_action.unwrap();
    let result = tools.dispatch_batch(&action).await;

    assert!(matches!(
        result,
        Err(Error::ExternalActionFailed { status_code: 500 })
    ));
    // The third call was never attempted
    let posts = harness.webhook.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[1].1, serde_json::json!({"text": "second"}));
    // The caller's batch is untouched
    assert!(action.calls.iter().all(|c| c.output.is_none()));

    engine.abandon();
    assert!(!harness.session.is_in_progress());
    assert!(harness.backend.submitted().is_empty());
}

#[tokio::test]
async fn test_resolve_rejects_non_action_kinds() {
    let harness = Harness::new(&[], &[]);
    let tools = harness.tools();

    let result = tools
        .resolve(EventKind::Listen, &serde_json::json!({"message": "x"}))
        .await;

    assert!(matches!(result, Err(Error::UnsupportedToolFunction(_))));
    assert!(harness.webhook.posts().is_empty());
}

#[tokio::test]
async fn test_resolve_accepts_string_arguments() {
    let harness = Harness::new(&[], &[]);
    let tools = harness.tools();

    let output = tools
        .resolve(
            EventKind::Zapier,
            &serde_json::Value::String(r#"{"message":"on my way"}"#.into()),
        )
        .await
        .unwrap();

    assert_eq!(output, "Success!");
    assert_eq!(
        harness.webhook.posts()[0].1,
        serde_json::json!({"text": "on my way"})
    );
}
