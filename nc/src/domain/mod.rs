//! Plan schema
//!
//! The data model for execution plans and their step tree, plus structural
//! validation. Pure data: nothing here talks to the engine.

mod agent;
mod flow;
mod path;
mod plan;
mod status;
mod validation;

pub use agent::{Agent, AgentStatus, AgentType, Tool, ToolType};
pub use flow::{
    Condition, ErrorHandling, ExecutionFlow, ExecutionStep, ExitCondition, FlowType, LoopType, ParallelAgent,
    RetryDelay, RetryPolicy, StepKind, parse_timeout,
};
pub use path::{FlowPath, FlowSegment, Scope, StepKey};
pub use plan::{ExecutionPlan, FlowDocument, HumanInTheLoop, PlanMetadata, TeamsIntegration};
pub use status::{
    ApiResponse, ApprovalRequest, DashboardStats, ExecutionPlanStatus, ExecutionStatus, PromptRequest, PromptResponse,
};
pub use validation::{
    ValidationError, ValidationIssue, parse_flow_document, parse_plan, validate_dependency_graph, validate_flow,
    validate_flow_document, validate_plan,
};
