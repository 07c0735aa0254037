//! End-to-end notifier tests: lock files, state files and a mock endpoint.

use notify_core::{
    Config, DedupManager, Notifier, NotifyRequest, Outcome, Sender, StateManager, Status,
    SuppressReason,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    notifier: Notifier,
    _temp: TempDir,
}

fn harness(config: Config) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let sender = Sender::new(&config).unwrap();
    let notifier = Notifier::new(config, sender)
        .with_dedup(DedupManager::with_dir(temp.path()))
        .with_state(StateManager::with_dir(temp.path()));
    Harness {
        notifier,
        _temp: temp,
    }
}

fn enabled_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.notifications.webhook.enabled = true;
    config.notifications.webhook.url = format!("{}/hook", server.uri());
    config.notifications.webhook.retry.enabled = false;
    config
}

fn request(event: &str, status: Status, message: &str) -> NotifyRequest {
    NotifyRequest {
        session_id: "session-42".to_string(),
        event: Some(event.to_string()),
        status,
        message: message.to_string(),
        tool_name: String::new(),
        cwd: "/proj".to_string(),
    }
}

#[tokio::test]
async fn test_sent_notification_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(enabled_config(&server));
    let outcome = h
        .notifier
        .notify(&request("Stop", Status::TaskComplete, "Tests pass."))
        .await
        .unwrap();
    assert!(outcome.is_sent());

    let state = h.notifier.state().load("session-42").unwrap().unwrap();
    assert_eq!(state.last_notification_status, "task_complete");
    assert_eq!(state.last_notification_message, "Tests pass.");
    assert!(state.last_task_complete_ts > 0);
    assert!(!h.notifier.dedup().content_lock_path("session-42").exists());
}

#[tokio::test]
async fn test_repeated_message_is_suppressed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(enabled_config(&server));
    h.notifier
        .notify(&request("Stop", Status::TaskComplete, "Done.."))
        .await
        .unwrap();

    let outcome = h
        .notifier
        .notify(&request("SubagentStop", Status::TaskComplete, "done."))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Suppressed(SuppressReason::DuplicateMessage)
    ));
}

#[tokio::test]
async fn test_question_after_plan_notification_is_suppressed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(enabled_config(&server));
    let mut plan = request("PreToolUse", Status::PlanReady, "Plan ready");
    plan.tool_name = "ExitPlanMode".to_string();
    assert!(h.notifier.notify(&plan).await.unwrap().is_sent());

    let state = h.notifier.state().load("session-42").unwrap().unwrap();
    assert_eq!(state.last_interactive_tool, "ExitPlanMode");

    let outcome = h
        .notifier
        .notify(&request("Notification", Status::Question, "Approve?"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Suppressed(SuppressReason::QuestionAfterNotification)
    ));
}

#[tokio::test]
async fn test_delivery_failure_is_an_outcome_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(enabled_config(&server));
    let outcome = h
        .notifier
        .notify(&request("Stop", Status::TaskComplete, "Done"))
        .await
        .unwrap();

    match outcome {
        Outcome::Failed(err) => assert_eq!(err.status(), Some(400)),
        other => panic!("expected Failed, got {other:?}"),
    }
    let state = h.notifier.state().load("session-42").unwrap().unwrap();
    assert!(state.last_notification_ts > 0);
    assert_eq!(state.last_notification_message, "Done");
}

#[tokio::test]
async fn test_same_message_after_failed_attempt_is_suppressed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(enabled_config(&server));
    let first = h
        .notifier
        .notify(&request("Stop", Status::TaskComplete, "Done"))
        .await
        .unwrap();
    assert!(matches!(first, Outcome::Failed(_)));

    let second = h
        .notifier
        .notify(&request("Notification", Status::TaskComplete, "Done"))
        .await
        .unwrap();
    assert!(matches!(
        second,
        Outcome::Suppressed(SuppressReason::DuplicateMessage)
    ));
}

#[tokio::test]
async fn test_rate_limited_drop_is_not_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = enabled_config(&server);
    config.notifications.webhook.rate_limit.enabled = true;
    config.notifications.webhook.rate_limit.requests_per_minute = 1;
    let h = harness(config);

    // Spend the only token directly so the notifier's send is rejected.
    h.notifier
        .sender()
        .send(Status::TaskComplete, "warm", "other-session")
        .await
        .unwrap();
    let outcome = h
        .notifier
        .notify(&request("Stop", Status::TaskComplete, "Done"))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Dropped(_)));

    let state = h.notifier.state().load("session-42").unwrap().unwrap();
    assert_eq!(state.last_notification_ts, 0);
}

#[tokio::test]
async fn test_cleanup_is_best_effort() {
    let h = harness(Config::default());
    h.notifier
        .notify(&request("Stop", Status::TaskComplete, "Done"))
        .await
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    let removed = h.notifier.cleanup(std::time::Duration::from_millis(1));
    assert!(removed >= 2);
    assert!(h.notifier.state().load("session-42").unwrap().is_none());
}
