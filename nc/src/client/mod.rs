//! Engine client
//!
//! The only boundary across which the console talks to the execution engine.
//! [`EngineApi`] is the seam the controller, browser and monitor depend on;
//! [`HttpEngineClient`] implements it over JSON/HTTP and [`RealtimeChannel`]
//! carries the WebSocket status push.

mod error;
mod http;
mod realtime;

pub use error::{EngineError, FailureClass, GENERIC_ERROR_MESSAGE, SERVER_ERROR_MESSAGE, classify_failure, structured_message};
pub use http::HttpEngineClient;
pub use realtime::{RealtimeChannel, RealtimeEvent, realtime_url};

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{
    Agent, ApiResponse, DashboardStats, ExecutionPlan, ExecutionPlanStatus, FlowDocument, FlowPath, PromptRequest,
    PromptResponse,
};
use crate::inputs::StepInput;

/// Body of the provisional execute-step call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecution {
    pub step_id: String,
    /// Scope of the step; empty for top-level steps
    pub flow_path: FlowPath,
    #[serde(flatten)]
    pub input: StepInput,
}

/// Operations the engine exposes
///
/// Object-safe so components can hold `&dyn EngineApi` and tests can swap in
/// a scripted engine.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Every plan the engine knows
    async fn list_plans(&self) -> Result<Vec<ExecutionPlan>, EngineError>;

    /// One plan's flow; `NotFound` if the plan no longer exists
    async fn get_flow(&self, plan_id: &str) -> Result<FlowDocument, EngineError>;

    /// Submit one step with operator inputs
    ///
    /// Provisional: the engine only acknowledges the request.
    async fn execute_step(&self, plan_id: &str, execution: &StepExecution) -> Result<ApiResponse, EngineError>;

    /// Start the whole plan; success means accepted, not completed
    async fn execute_flow(&self, plan_id: &str) -> Result<ApiResponse, EngineError>;

    /// Live status snapshot
    async fn plan_status(&self, plan_id: &str) -> Result<ExecutionPlanStatus, EngineError>;

    /// Agents taking part in a plan's execution
    async fn plan_agents(&self, plan_id: &str) -> Result<Vec<Agent>, EngineError>;

    async fn stop_execution(&self, plan_id: &str) -> Result<ApiResponse, EngineError>;

    /// Approve or reject a gated step
    async fn submit_approval(
        &self,
        plan_id: &str,
        step_id: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<ApiResponse, EngineError>;

    /// Turn a natural-language prompt into a plan
    async fn process_prompt(&self, request: &PromptRequest) -> Result<PromptResponse, EngineError>;

    async fn active_executions(&self) -> Result<Vec<ExecutionPlanStatus>, EngineError>;

    async fn dashboard_stats(&self) -> Result<DashboardStats, EngineError>;
}
