//! Live execution projections and engine response envelopes
//!
//! Everything here is read-only: the console displays what the engine reports
//! and never derives status locally.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Categorical execution status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
    /// Engine-specific values such as `CREATED` or `STOPPED`
    Other(String),
}

impl ExecutionStatus {
    /// No further transitions expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl From<String> for ExecutionStatus {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            "paused" => Self::Paused,
            _ => Self::Other(value),
        }
    }
}

impl From<ExecutionStatus> for String {
    fn from(value: ExecutionStatus) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Paused => write!(f, "paused"),
            Self::Other(other) => write!(f, "{}", other.to_lowercase()),
        }
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Live snapshot of one plan's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionPlanStatus {
    pub plan_id: String,
    pub status: ExecutionStatus,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub total_agents: u32,
    pub active_agents: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Fraction in `[0, 1]` when the engine reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(alias = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionPlanStatus {
    /// Completion as a percentage, preferring the step counters
    pub fn percent(&self) -> u16 {
        if self.total_steps > 0 {
            let pct = (u64::from(self.completed_steps) * 100) / u64::from(self.total_steps);
            return pct.min(100) as u16;
        }
        match self.progress {
            Some(p) if p.is_finite() => (p.clamp(0.0, 1.0) * 100.0).round() as u16,
            _ => 0,
        }
    }
}

/// Aggregate dashboard numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    pub total_agents: u64,
    pub active_executions: u64,
    pub completed_executions: u64,
    pub failed_executions: u64,
    pub total_execution_time: f64,
    pub average_execution_time: f64,
}

/// Generic engine acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    /// Text worth showing the operator
    pub fn summary(&self) -> &str {
        if !self.message.is_empty() {
            &self.message
        } else if let Some(error) = &self.error {
            error
        } else if self.success {
            "ok"
        } else {
            "request was not accepted"
        }
    }
}

/// Prompt submission body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

/// Prompt submission result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
}

/// Approval decision for a gated step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}
