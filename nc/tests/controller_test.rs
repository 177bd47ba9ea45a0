//! Operator scenarios: select a plan, fill in inputs, act on steps

mod common;

use std::sync::Arc;

use nebula_console::browser::{Completion, PlanBrowser};
use nebula_console::controller::ActionOutcome;
use nebula_console::domain::StepKey;
use nebula_console::inputs::{EditOutcome, StepInputField};
use nebula_console::notify::{Level, NotificationBus, NotificationKind};
use nebula_console::session::Session;

use common::{Stub, client, drain};

const NESTED_FLOW: &str = include_str!("fixtures/nested_flow.json");

fn fix_key() -> StepKey {
    StepKey::new("review-loop:body/check:then".parse().unwrap(), "fix")
}

#[tokio::test]
async fn test_select_edit_and_execute_nested_step() {
    let stub = Stub::serve(vec![
        (200, NESTED_FLOW.to_string()),
        (200, r#"{"success":true,"message":""}"#.to_string()),
    ])
    .await;
    let (engine, mut rx) = client(&stub, Arc::new(Session::new()));

    let mut browser = PlanBrowser::new();
    assert_eq!(browser.load(&engine, "plan-nested").await, Completion::Loaded);

    let controller = browser.controller_mut().expect("controller after load");
    let key = fix_key();
    assert_eq!(
        controller.set_input(&key, StepInputField::ApiKey, "k-123"),
        EditOutcome::Applied
    );
    let outcome = controller.set_input(&key, StepInputField::Configuration, "{oops");
    assert!(matches!(outcome, EditOutcome::Retained { .. }));
    assert_eq!(controller.configuration_text(&key), "{oops");

    let bus = NotificationBus::default();
    let mut action_rx = bus.subscribe();
    let outcome = controller.execute_step(&engine, &bus, &key).await;
    assert!(outcome.is_accepted(), "outcome: {}", outcome.message());

    let toasts = drain(&mut action_rx);
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].level, Level::Success);
    assert_eq!(toasts[0].message, format!("Step {} submitted for execution", key));

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].request_line, "GET /api/v1/execution-plans/plan-nested/flow HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&requests[1].body).unwrap();
    assert_eq!(body["instruction"], "Fix the issues", "declared instruction fills the empty input");
    assert_eq!(body["apiKey"], "k-123");
    assert_eq!(body["configuration"], serde_json::json!({}));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_step_without_instruction_is_blocked_locally() {
    let stub = Stub::serve(vec![(200, NESTED_FLOW.to_string())]).await;
    let (engine, _rx) = client(&stub, Arc::new(Session::new()));

    let mut browser = PlanBrowser::new();
    assert_eq!(browser.load(&engine, "plan-nested").await, Completion::Loaded);
    let controller = browser.controller().expect("controller after load");

    let bus = NotificationBus::default();
    let mut action_rx = bus.subscribe();
    let key = StepKey::new("review-loop:body/check:else".parse().unwrap(), "approve");
    let outcome = controller.execute_step(&engine, &bus, &key).await;

    assert!(matches!(outcome, ActionOutcome::Blocked(_)));
    assert!(!outcome.was_dispatched());
    let toasts = drain(&mut action_rx);
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].kind, NotificationKind::InputBlocked);
    assert_eq!(stub.requests().len(), 1, "nothing sent for a blocked step");
}

#[tokio::test]
async fn test_engine_rejection_is_toasted_once() {
    let stub = Stub::serve(vec![
        (200, NESTED_FLOW.to_string()),
        (200, r#"{"success":false,"message":"Plan already running"}"#.to_string()),
    ])
    .await;
    let (engine, mut rx) = client(&stub, Arc::new(Session::new()));

    let mut browser = PlanBrowser::new();
    browser.load(&engine, "plan-nested").await;
    let controller = browser.controller().expect("controller after load");

    let bus = NotificationBus::default();
    let mut action_rx = bus.subscribe();
    let outcome = controller.execute_flow(&engine, &bus).await;

    assert!(matches!(outcome, ActionOutcome::Rejected(_)));
    let toasts = drain(&mut action_rx);
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].message, "Plan already running");
    assert!(drain(&mut rx).is_empty(), "client stays quiet for an answered request");
}

#[tokio::test]
async fn test_missing_plan_clears_selection() {
    let stub = Stub::serve(vec![(404, r#"{"message":"Plan not found"}"#.to_string())]).await;
    let (engine, _rx) = client(&stub, Arc::new(Session::new()));

    let mut browser = PlanBrowser::new();
    assert_eq!(browser.load(&engine, "plan-gone").await, Completion::Missing);
    assert!(browser.selected_plan_id().is_none());
    assert!(browser.controller().is_none());
    assert_eq!(browser.display_error(), Some("Plan plan-gone no longer exists"));
}
