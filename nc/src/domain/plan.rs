//! Execution plan aggregate
//!
//! Plans are created by the engine; the console reads them and triggers
//! transitions through the engine client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::agent::Agent;
use super::flow::ExecutionFlow;

/// Descriptive plan metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanMetadata {
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Teams meeting bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamsIntegration {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub speech_to_text: bool,
    pub text_to_speech: bool,
}

/// Operator approval policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HumanInTheLoop {
    pub enabled: bool,

    /// Step ids that wait for operator approval
    #[serde(alias = "approvalSteps")]
    pub approval_required: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams_integration: Option<TeamsIntegration>,
}

/// Root plan aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub version: String,
    pub metadata: PlanMetadata,
    pub agents: Vec<Agent>,
    pub execution_flow: ExecutionFlow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_context: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_in_the_loop: Option<HumanInTheLoop>,
}

impl ExecutionPlan {
    /// Look up a declared agent
    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    /// Name for lists, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.metadata.name.is_empty() {
            &self.plan_id
        } else {
            &self.metadata.name
        }
    }

    /// Whether the operator must approve `step_id` before it proceeds
    pub fn requires_approval(&self, step_id: &str) -> bool {
        self.human_in_the_loop
            .as_ref()
            .is_some_and(|hitl| hitl.enabled && hitl.approval_required.iter().any(|id| id == step_id))
    }

    /// Flow view of this plan
    pub fn to_flow_document(&self) -> FlowDocument {
        FlowDocument {
            plan_id: self.plan_id.clone(),
            plan_name: self.metadata.name.clone(),
            execution_flow: self.execution_flow.clone(),
            agents: self.agents.clone(),
        }
    }
}

/// What the flow endpoint returns for one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowDocument {
    pub plan_id: String,
    pub plan_name: String,
    pub execution_flow: ExecutionFlow,
    pub agents: Vec<Agent>,
}

impl FlowDocument {
    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }
}
