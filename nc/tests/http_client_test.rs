//! HTTP engine client tests against an in-process stub server

mod common;

use std::sync::Arc;

use nebula_console::client::{EngineApi, EngineError, SERVER_ERROR_MESSAGE, StepExecution};
use nebula_console::domain::StepKey;
use nebula_console::inputs::StepInput;
use nebula_console::notify::{Level, NotificationKind};
use nebula_console::session::Session;

use common::{Stub, client, drain};

const NIGHTLY_SYNC: &str = include_str!("fixtures/nightly_sync.json");

#[tokio::test]
async fn test_list_plans_sends_bearer_token() {
    let stub = Stub::serve(vec![(200, format!("[{}]", NIGHTLY_SYNC))]).await;
    let (client, mut rx) = client(&stub, Arc::new(Session::with_token("tok-1")));

    let plans = client.list_plans().await.expect("plans");
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].plan_id, "plan-nightly-sync");

    let requests = stub.requests();
    assert_eq!(requests[0].request_line, "GET /api/v1/execution-plans HTTP/1.1");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok-1"));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_unauthorized_clears_session_once() {
    let body = r#"{"message":"token expired"}"#.to_string();
    let stub = Stub::serve(vec![(401, body.clone()), (401, body)]).await;
    let session = Arc::new(Session::with_token("tok-1"));
    let (client, mut rx) = client(&stub, Arc::clone(&session));

    let first = client.dashboard_stats().await.unwrap_err();
    assert!(matches!(first, EngineError::Unauthorized { reauth: true }));
    assert!(!session.is_authenticated());

    // Sent without a token: login already requested, nothing to say
    let second = client.dashboard_stats().await.unwrap_err();
    assert!(matches!(second, EngineError::Unauthorized { reauth: false }));

    assert_eq!(session.clear_count(), 1);
    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::ReauthRequired);
    assert_eq!(stub.requests()[1].authorization, None);
}

#[tokio::test]
async fn test_unauthorized_without_token_requests_login() {
    let body = r#"{"message":"login required"}"#.to_string();
    let stub = Stub::serve(vec![(401, body.clone()), (401, body)]).await;
    let session = Arc::new(Session::new());
    let (client, mut rx) = client(&stub, Arc::clone(&session));

    let first = client.list_plans().await.unwrap_err();
    assert!(matches!(first, EngineError::Unauthorized { reauth: true }));
    let second = client.list_plans().await.unwrap_err();
    assert!(matches!(second, EngineError::Unauthorized { reauth: false }));

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::ReauthRequired);
    assert!(session.reauth_pending());
    assert_eq!(session.clear_count(), 0);
}

#[tokio::test]
async fn test_server_error_uses_generic_server_message() {
    let stub = Stub::serve(vec![(503, r#"{"message":"database down"}"#.to_string())]).await;
    let (client, mut rx) = client(&stub, Arc::new(Session::new()));

    let err = client.execute_flow("plan-nightly-sync").await.unwrap_err();
    assert!(matches!(err, EngineError::Server { status: 503 }));

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, Level::Error);
    assert_eq!(notifications[0].message, SERVER_ERROR_MESSAGE);
}

#[tokio::test]
async fn test_structured_message_is_shown_verbatim() {
    let stub = Stub::serve(vec![(409, r#"{"message":"Plan is locked"}"#.to_string())]).await;
    let (client, mut rx) = client(&stub, Arc::new(Session::new()));

    let err = client.stop_execution("plan-nightly-sync").await.unwrap_err();
    assert!(matches!(err, EngineError::Rejected { status: 409, .. }));

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::RequestFailed);
    assert_eq!(notifications[0].message, "Plan is locked");
}

#[tokio::test]
async fn test_missing_plan_is_not_found() {
    let stub = Stub::serve(vec![(404, String::new())]).await;
    let (client, _rx) = client(&stub, Arc::new(Session::new()));

    let err = client.get_flow("gone").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_execute_step_posts_inputs_to_step_path() {
    let stub = Stub::serve(vec![(200, String::new())]).await;
    let (client, mut rx) = client(&stub, Arc::new(Session::new()));

    let key = StepKey::new("review-loop:body/check:then".parse().unwrap(), "fix");
    let execution = StepExecution {
        step_id: key.step_id.clone(),
        flow_path: key.flow.clone(),
        input: StepInput {
            instruction: "Fix the issues".to_string(),
            api_key: Some("k-123".to_string()),
            ..Default::default()
        },
    };

    let ack = client.execute_step("P 1", &execution).await.expect("ack");
    assert!(ack.success, "empty body is an acknowledgement");

    let requests = stub.requests();
    assert_eq!(requests[0].request_line, "POST /api/v1/execution-plans/P%201/steps/fix/execute HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["stepId"], "fix");
    assert_eq!(body["flowPath"], "review-loop:body/check:then");
    assert_eq!(body["instruction"], "Fix the issues");
    assert_eq!(body["apiKey"], "k-123");
    assert!(drain(&mut rx).is_empty());
}
