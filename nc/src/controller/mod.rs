//! Flow controller
//!
//! Walks the operator through one plan's top-level steps as a wizard, holds
//! the per-step operator inputs, and turns "execute step" / "execute whole
//! flow" intents into engine requests. Nested scopes are reached through
//! [`StepKey`]s and shown with [`outline`].
//!
//! Notification ownership: the engine client reports request failures; the
//! controller reports what the engine said about an accepted request and
//! anything it blocked locally. A failure is never toasted twice.

mod outline;

pub use outline::{OutlineRow, detail, outline};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{EngineApi, EngineError, StepExecution};
use crate::domain::{Agent, ApiResponse, ExecutionFlow, ExecutionStep, FlowDocument, FlowPath, StepKey};
use crate::inputs::{EditOutcome, StepInput, StepInputField, StepInputStore};
use crate::notify::{Notification, NotificationBus};

/// An action blocked before anything was sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperatorInputError {
    #[error("Step {step} has no instruction; enter one before executing")]
    EmptyInstruction { step: StepKey },

    #[error("Step {step} is not part of this plan")]
    UnknownStep { step: StepKey },

    #[error("Enter a prompt before submitting")]
    EmptyPrompt,
}

/// What came of an operator action
#[derive(Debug)]
pub enum ActionOutcome {
    /// The engine acknowledged the request with `success: true`
    Accepted(ApiResponse),
    /// The engine answered but declined
    Rejected(ApiResponse),
    /// Nothing was sent
    Blocked(OperatorInputError),
    /// The request failed; the engine client has already notified
    Failed(EngineError),
}

impl ActionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Whether a request reached the engine boundary
    pub fn was_dispatched(&self) -> bool {
        !matches!(self, Self::Blocked(_))
    }

    /// Text for CLI output
    pub fn message(&self) -> String {
        match self {
            Self::Accepted(response) | Self::Rejected(response) => response.summary().to_string(),
            Self::Blocked(err) => err.to_string(),
            Self::Failed(err) => err.to_string(),
        }
    }
}

/// Interactive controller for one selected plan
///
/// Cloning takes a snapshot, inputs included, that can be moved into a task.
#[derive(Debug, Clone)]
pub struct FlowController {
    plan_id: String,
    plan_name: String,
    flow: ExecutionFlow,
    agents: Vec<Agent>,
    active_step: usize,
    inputs: StepInputStore,
}

impl FlowController {
    /// Controller over a validated flow document, positioned on the first step
    pub fn new(document: FlowDocument) -> Self {
        debug!(plan_id = %document.plan_id, steps = document.execution_flow.steps.len(), "FlowController::new: called");
        Self {
            plan_id: document.plan_id,
            plan_name: document.plan_name,
            flow: document.execution_flow,
            agents: document.agents,
            active_step: 0,
            inputs: StepInputStore::new(),
        }
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    /// Plan name, falling back to the id
    pub fn plan_name(&self) -> &str {
        if self.plan_name.is_empty() { &self.plan_id } else { &self.plan_name }
    }

    pub fn flow(&self) -> &ExecutionFlow {
        &self.flow
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Number of top-level steps
    pub fn len(&self) -> usize {
        self.flow.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flow.steps.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active_step
    }

    fn last_index(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Move to the next step; no-op on the last one
    pub fn advance(&mut self) -> usize {
        if self.active_step < self.last_index() {
            self.active_step += 1;
        }
        self.active_step
    }

    /// Move to the previous step; no-op on the first one
    pub fn retreat(&mut self) -> usize {
        self.active_step = self.active_step.saturating_sub(1);
        self.active_step
    }

    /// Jump to `index`, clamped into range
    pub fn go_to(&mut self, index: usize) -> usize {
        self.active_step = index.min(self.last_index());
        self.active_step
    }

    pub fn current_step(&self) -> Option<&ExecutionStep> {
        self.flow.steps.get(self.active_step)
    }

    pub fn current_key(&self) -> Option<StepKey> {
        self.current_step().map(|step| StepKey::top(step.step_id.clone()))
    }

    /// Resolve a step anywhere in the tree
    pub fn step(&self, key: &StepKey) -> Option<&ExecutionStep> {
        key.resolve(&self.flow)
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    /// The step's agent; `None` for steps without one or with an unknown id
    pub fn agent_for(&self, step: &ExecutionStep) -> Option<&Agent> {
        step.agent_id.as_deref().and_then(|id| self.agent(id))
    }

    pub fn inputs(&self) -> &StepInputStore {
        &self.inputs
    }

    /// Apply one operator edit
    pub fn set_input(&mut self, key: &StepKey, field: StepInputField, value: &str) -> EditOutcome {
        self.inputs.set(key, field, value)
    }

    /// Input as it would be sent
    ///
    /// The step's declared instruction fills an empty operator instruction,
    /// and its parameters stand in for a configuration the operator never set.
    pub fn resolved_input(&self, key: &StepKey) -> StepInput {
        let mut input = self.inputs.get(key);
        if let Some(step) = self.step(key) {
            if input.instruction.trim().is_empty() {
                input.instruction = step.declared_instruction().to_string();
            }
            if !self.inputs.has_configuration(key) {
                input.configuration = step.parameters.clone();
            }
        }
        input
    }

    /// Local checks before dispatch
    pub fn prepare_step(&self, key: &StepKey) -> Result<StepExecution, OperatorInputError> {
        if self.step(key).is_none() {
            return Err(OperatorInputError::UnknownStep { step: key.clone() });
        }
        let input = self.resolved_input(key);
        if input.instruction.trim().is_empty() {
            return Err(OperatorInputError::EmptyInstruction { step: key.clone() });
        }
        Ok(StepExecution {
            step_id: key.step_id.clone(),
            flow_path: key.flow.clone(),
            input,
        })
    }

    /// Submit one step with its resolved input
    pub async fn execute_step(&self, engine: &dyn EngineApi, notifications: &NotificationBus, key: &StepKey) -> ActionOutcome {
        debug!(plan_id = %self.plan_id, %key, "execute_step: called");
        let execution = match self.prepare_step(key) {
            Ok(execution) => execution,
            Err(err) => {
                info!(plan_id = %self.plan_id, %key, error = %err, "execute_step: blocked");
                notifications.publish(Notification::input_blocked(err.to_string()));
                return ActionOutcome::Blocked(err);
            }
        };

        let result = engine.execute_step(&self.plan_id, &execution).await;
        report(result, notifications, || format!("Step {} submitted for execution", key))
    }

    /// Start the whole plan; per-step inputs are not required
    pub async fn execute_flow(&self, engine: &dyn EngineApi, notifications: &NotificationBus) -> ActionOutcome {
        debug!(plan_id = %self.plan_id, "execute_flow: called");
        let result = engine.execute_flow(&self.plan_id).await;
        report(result, notifications, || format!("Execution of {} started", self.plan_name()))
    }

    pub async fn stop_execution(&self, engine: &dyn EngineApi, notifications: &NotificationBus) -> ActionOutcome {
        debug!(plan_id = %self.plan_id, "stop_execution: called");
        let result = engine.stop_execution(&self.plan_id).await;
        report(result, notifications, || format!("Execution of {} stopped", self.plan_name()))
    }

    /// Approve or reject a gated step
    pub async fn submit_approval(
        &self,
        engine: &dyn EngineApi,
        notifications: &NotificationBus,
        key: &StepKey,
        approved: bool,
        feedback: Option<String>,
    ) -> ActionOutcome {
        debug!(plan_id = %self.plan_id, %key, approved, "submit_approval: called");
        if self.step(key).is_none() {
            let err = OperatorInputError::UnknownStep { step: key.clone() };
            notifications.publish(Notification::input_blocked(err.to_string()));
            return ActionOutcome::Blocked(err);
        }
        let result = engine
            .submit_approval(&self.plan_id, &key.step_id, approved, feedback)
            .await;
        let verb = if approved { "approved" } else { "rejected" };
        report(result, notifications, || format!("Step {} {}", key, verb))
    }

    /// Outline of the whole tree
    pub fn outline(&self) -> Vec<OutlineRow> {
        let steps: Vec<&ExecutionStep> = self.flow.steps.iter().collect();
        outline(&steps, &FlowPath::root(), &self.agents)
    }

    /// Outline of everything nested under one step
    pub fn step_outline(&self, key: &StepKey) -> Vec<OutlineRow> {
        let Some(step) = self.step(key) else {
            return Vec::new();
        };
        let mut rows = Vec::new();
        for (scope, children) in step.child_scopes() {
            let path = key.flow.child(key.step_id.clone(), scope);
            rows.extend(outline(&children, &path, &self.agents));
        }
        rows
    }

    /// Configuration text for the editor: a pending draft, else the resolved object
    pub fn configuration_text(&self, key: &StepKey) -> String {
        if let Some(draft) = self.inputs.draft(key) {
            return draft.to_string();
        }
        let configuration: Map<String, Value> = self.resolved_input(key).configuration;
        if configuration.is_empty() {
            return String::new();
        }
        serde_json::to_string_pretty(&Value::Object(configuration)).unwrap_or_default()
    }
}

/// Turn an engine answer into an outcome and publish the action toast
///
/// `accepted` builds the toast text when the engine sent no message.
pub fn report(
    result: Result<ApiResponse, EngineError>,
    notifications: &NotificationBus,
    accepted: impl FnOnce() -> String,
) -> ActionOutcome {
    match result {
        Ok(response) if response.success => {
            let message = if response.message.is_empty() {
                accepted()
            } else {
                response.message.clone()
            };
            info!(%message, "action accepted");
            notifications.publish(Notification::success(message));
            ActionOutcome::Accepted(response)
        }
        Ok(response) => {
            warn!(message = %response.summary(), "action rejected by engine");
            notifications.publish(Notification::rejected(response.summary()));
            ActionOutcome::Rejected(response)
        }
        Err(err) => {
            debug!(error = %err, "action failed");
            ActionOutcome::Failed(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{Call, MockEngine};
    use crate::domain::Scope;
    use crate::notify::{Level, NotificationKind};
    use proptest::prelude::*;
    use serde_json::json;

    fn document() -> FlowDocument {
        serde_json::from_str(
            r#"{
                "planId": "P1",
                "planName": "Nightly sync",
                "agents": [{"agentId": "A1", "name": "Fetcher", "type": "data", "language": "python"}],
                "executionFlow": {"type": "sequential", "steps": [
                    {"stepId": "S1", "type": "sequential", "agentId": "A1", "instruction": "x"},
                    {"stepId": "S2", "type": "sequential", "agentId": "A1",
                     "parameters": {"limit": 10}},
                    {"stepId": "S3", "type": "task"},
                    {"stepId": "L", "type": "loop", "loopType": "foreach",
                     "exitCondition": {"expression": "empty", "maxIterations": 5},
                     "body": [{"stepId": "S1", "type": "sequential", "agentId": "A1"}]}
                ]}
            }"#,
        )
        .unwrap()
    }

    fn accepted() -> ApiResponse {
        ApiResponse {
            success: true,
            ..Default::default()
        }
    }

    fn flow_with(len: usize) -> FlowController {
        let steps = (0..len).map(|i| ExecutionStep::task(format!("S{}", i), "task")).collect();
        FlowController::new(FlowDocument {
            plan_id: "P".to_string(),
            execution_flow: ExecutionFlow::new(Default::default(), steps),
            ..Default::default()
        })
    }

    #[test]
    fn test_navigation_clamps() {
        let mut c = FlowController::new(document());
        assert_eq!(c.active_index(), 0);
        assert_eq!(c.retreat(), 0);
        assert_eq!(c.advance(), 1);
        assert_eq!(c.go_to(99), 3);
        assert_eq!(c.advance(), 3);
        assert_eq!(c.current_step().unwrap().step_id, "L");
    }

    #[test]
    fn test_navigation_on_empty_flow() {
        let mut c = flow_with(0);
        assert_eq!(c.advance(), 0);
        assert_eq!(c.retreat(), 0);
        assert!(c.current_step().is_none());
        assert!(c.current_key().is_none());
    }

    proptest! {
        #[test]
        fn prop_active_step_stays_in_range(len in 1usize..20, ops in prop::collection::vec(0u8..3, 0..60)) {
            let mut c = flow_with(len);
            for op in ops {
                match op {
                    0 => { c.advance(); }
                    1 => { c.retreat(); }
                    _ => { c.go_to(len * 2); }
                }
                prop_assert!(c.active_index() < len);
            }
        }

        #[test]
        fn prop_advance_reaches_last(len in 1usize..30) {
            let mut c = flow_with(len);
            for _ in 0..len - 1 {
                c.advance();
            }
            prop_assert_eq!(c.active_index(), len - 1);
            c.advance();
            prop_assert_eq!(c.active_index(), len - 1);
        }
    }

    #[test]
    fn test_agent_lookup() {
        let c = FlowController::new(document());
        let s1 = c.step(&StepKey::top("S1")).unwrap();
        assert_eq!(c.agent_for(s1).unwrap().name, "Fetcher");
        let s3 = c.step(&StepKey::top("S3")).unwrap();
        assert!(c.agent_for(s3).is_none());
    }

    #[test]
    fn test_nested_step_resolution() {
        let c = FlowController::new(document());
        let nested = StepKey::new(FlowPath::root().child("L", Scope::Body), "S1");
        let step = c.step(&nested).unwrap();
        assert!(step.instruction.is_none());
        assert_eq!(c.step(&StepKey::top("S1")).unwrap().declared_instruction(), "x");
    }

    #[test]
    fn test_resolved_input_falls_back_to_declared() {
        let mut c = FlowController::new(document());
        let s2 = StepKey::top("S2");

        let input = c.resolved_input(&s2);
        assert_eq!(input.configuration.get("limit"), Some(&json!(10)));

        c.set_input(&s2, StepInputField::Configuration, "{}");
        assert!(c.resolved_input(&s2).configuration.is_empty());

        assert_eq!(c.resolved_input(&StepKey::top("S1")).instruction, "x");
        c.set_input(&StepKey::top("S1"), StepInputField::Instruction, "override");
        assert_eq!(c.resolved_input(&StepKey::top("S1")).instruction, "override");
    }

    #[test]
    fn test_prepare_step_blocks_empty_instruction() {
        let c = FlowController::new(document());
        let err = c.prepare_step(&StepKey::top("S2")).unwrap_err();
        assert!(matches!(err, OperatorInputError::EmptyInstruction { .. }));

        let err = c.prepare_step(&StepKey::top("nope")).unwrap_err();
        assert!(matches!(err, OperatorInputError::UnknownStep { .. }));
    }

    #[test]
    fn test_whitespace_instruction_is_empty() {
        let mut c = FlowController::new(document());
        let s3 = StepKey::top("S3");
        c.set_input(&s3, StepInputField::Instruction, "   ");
        assert!(c.prepare_step(&s3).is_err());
    }

    #[tokio::test]
    async fn test_execute_step_scenario() {
        let engine = MockEngine::new().with_ack(accepted());
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();
        let c = FlowController::new(document());

        let outcome = c.execute_step(&engine, &bus, &StepKey::top("S1")).await;

        assert!(outcome.is_accepted());
        assert_eq!(engine.call_count(), 1);
        match &engine.calls()[0] {
            Call::ExecuteStep(plan_id, execution) => {
                assert_eq!(plan_id, "P1");
                assert_eq!(execution.step_id, "S1");
                assert_eq!(execution.input.instruction, "x");
                assert!(execution.flow_path.is_root());
            }
            other => panic!("unexpected call: {:?}", other),
        }
        let toast = rx.try_recv().unwrap();
        assert_eq!(toast.level, Level::Success);
        assert_eq!(toast.message, "Step S1 submitted for execution");
    }

    #[tokio::test]
    async fn test_blocked_step_sends_nothing() {
        let engine = MockEngine::new();
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();
        let c = FlowController::new(document());

        let outcome = c.execute_step(&engine, &bus, &StepKey::top("S2")).await;

        assert!(!outcome.was_dispatched());
        assert_eq!(engine.call_count(), 0);
        assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::InputBlocked);
    }

    #[tokio::test]
    async fn test_nested_step_carries_flow_path() {
        let engine = MockEngine::new().with_ack(accepted());
        let bus = NotificationBus::default();
        let mut c = FlowController::new(document());
        let nested = StepKey::new(FlowPath::root().child("L", Scope::Body), "S1");
        c.set_input(&nested, StepInputField::Instruction, "inner");

        c.execute_step(&engine, &bus, &nested).await;

        match &engine.calls()[0] {
            Call::ExecuteStep(_, execution) => {
                assert_eq!(execution.flow_path.to_string(), "L:body");
                assert_eq!(execution.input.instruction, "inner");
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejection_is_toasted_verbatim() {
        let engine = MockEngine::new().with_ack(ApiResponse {
            success: false,
            message: "Plan is already running".to_string(),
            ..Default::default()
        });
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();
        let c = FlowController::new(document());

        let outcome = c.execute_flow(&engine, &bus).await;

        assert!(matches!(outcome, ActionOutcome::Rejected(_)));
        let toast = rx.try_recv().unwrap();
        assert_eq!(toast.level, Level::Error);
        assert_eq!(toast.message, "Plan is already running");
    }

    #[tokio::test]
    async fn test_engine_failure_not_toasted_twice() {
        let engine = MockEngine::new();
        engine.push_ack(Err(EngineError::Server { status: 503 }));
        let bus = NotificationBus::default();
        let mut rx = bus.subscribe();
        let c = FlowController::new(document());

        let outcome = c.execute_flow(&engine, &bus).await;

        assert!(matches!(outcome, ActionOutcome::Failed(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_execute_flow_ignores_missing_inputs() {
        let engine = MockEngine::new().with_ack(accepted());
        let bus = NotificationBus::default();
        let c = FlowController::new(document());

        let outcome = c.execute_flow(&engine, &bus).await;

        assert!(outcome.is_accepted());
        assert_eq!(engine.calls(), vec![Call::ExecuteFlow("P1".to_string())]);
    }

    #[tokio::test]
    async fn test_actions_keep_active_step() {
        let engine = MockEngine::new().with_ack(accepted()).with_ack(accepted());
        let bus = NotificationBus::default();
        let mut c = FlowController::new(document());
        c.go_to(2);

        c.execute_step(&engine, &bus, &StepKey::top("S1")).await;
        c.execute_flow(&engine, &bus).await;

        assert_eq!(c.active_index(), 2);
    }

    #[tokio::test]
    async fn test_submit_approval() {
        let engine = MockEngine::new().with_ack(accepted());
        let bus = NotificationBus::default();
        let c = FlowController::new(document());

        let outcome = c
            .submit_approval(&engine, &bus, &StepKey::top("S3"), false, Some("not yet".to_string()))
            .await;

        assert!(outcome.is_accepted());
        assert_eq!(
            engine.calls(),
            vec![Call::Approval("P1".to_string(), "S3".to_string(), false, Some("not yet".to_string()))]
        );
    }

    #[test]
    fn test_step_outline_and_bound() {
        let c = FlowController::new(document());
        let rows = c.step_outline(&StepKey::top("L"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.to_string(), "L:body/S1");

        let all = c.outline();
        let looped = all.iter().find(|r| r.key == StepKey::top("L")).unwrap();
        assert!(looped.detail.as_deref().unwrap().contains("maxIterations: 5"));
    }

    #[test]
    fn test_configuration_text_prefers_draft() {
        let mut c = FlowController::new(document());
        let s2 = StepKey::top("S2");
        assert!(c.configuration_text(&s2).contains("\"limit\": 10"));

        c.set_input(&s2, StepInputField::Configuration, "{oops");
        assert_eq!(c.configuration_text(&s2), "{oops");
    }
}
