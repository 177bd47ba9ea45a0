//! Agent and tool types
//!
//! Agents are declared once per plan and referenced from steps by `agentId`.
//! The console never mutates them; they exist for validation and display.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Categorical agent role
///
/// The engine has used more than one spelling for the same role over time
/// (`control` and `control-plane`, `data` and `data-agent`), so aliases fold
/// into the canonical variant and anything unknown is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    Control,
    Data,
    Tool,
    HumanInterface,
    Other(String),
}

impl From<String> for AgentType {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "control" | "control-plane" | "orchestration-agent" => Self::Control,
            "data" | "data-plane" | "data-agent" => Self::Data,
            "tool" | "tool-agent" => Self::Tool,
            "human-interface" => Self::HumanInterface,
            _ => Self::Other(value),
        }
    }
}

impl From<AgentType> for String {
    fn from(value: AgentType) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Data => write!(f, "data"),
            Self::Tool => write!(f, "tool"),
            Self::HumanInterface => write!(f, "human-interface"),
            Self::Other(other) => write!(f, "{}", other),
        }
    }
}

impl Default for AgentType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

/// Runtime status the engine reports for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[serde(alias = "IDLE")]
    Idle,
    #[serde(alias = "RUNNING")]
    Running,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "FAILED")]
    Failed,
    #[serde(alias = "STOPPED")]
    Stopped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Tool category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Database,
    Api,
    File,
    Notification,
    Integration,
    #[default]
    #[serde(other)]
    Other,
}

/// A tool owned by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Tool {
    pub tool_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Map<String, Value>>,
}

/// A named executor referenced by steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Agent {
    /// Unique within the owning plan
    pub agent_id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub agent_type: AgentType,

    /// Open tag: java, python, rust, ...
    pub language: String,

    /// Ordered, informational
    pub capabilities: Vec<String>,

    pub tools: Vec<Tool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Agent {
    /// Display name, falling back to the id when the engine sent no name
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.agent_id } else { &self.name }
    }

    /// One-line profile: `name (type, language)`
    pub fn profile(&self) -> String {
        let mut parts = Vec::new();
        let kind = self.agent_type.to_string();
        if !kind.is_empty() {
            parts.push(kind);
        }
        if !self.language.is_empty() {
            parts.push(self.language.clone());
        }
        if parts.is_empty() {
            self.display_name().to_string()
        } else {
            format!("{} ({})", self.display_name(), parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_aliases_fold() {
        assert_eq!(AgentType::from("control-plane".to_string()), AgentType::Control);
        assert_eq!(AgentType::from("DATA".to_string()), AgentType::Data);
        assert_eq!(AgentType::from("tool-agent".to_string()), AgentType::Tool);
        assert_eq!(
            AgentType::from("quantum".to_string()),
            AgentType::Other("quantum".to_string())
        );
    }

    #[test]
    fn test_agent_deserialize_minimal() {
        let json = r#"{"agentId":"a1","name":"Fetcher","type":"data","language":"python","capabilities":["fetch","parse"]}"#;
        let agent: Agent = serde_json::from_str(json).unwrap();

        assert_eq!(agent.agent_id, "a1");
        assert_eq!(agent.agent_type, AgentType::Data);
        assert_eq!(agent.capabilities, vec!["fetch", "parse"]);
        assert!(agent.tools.is_empty());
        assert!(agent.status.is_none());
    }

    #[test]
    fn test_agent_status_accepts_uppercase() {
        let status: AgentStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(status, AgentStatus::Running);
    }

    #[test]
    fn test_unknown_tool_type() {
        let tool: Tool = serde_json::from_str(r#"{"toolId":"t","name":"n","type":"ftp"}"#).unwrap();
        assert_eq!(tool.tool_type, ToolType::Other);
    }

    #[test]
    fn test_profile() {
        let agent = Agent {
            agent_id: "a1".to_string(),
            agent_type: AgentType::HumanInterface,
            language: "java".to_string(),
            ..Default::default()
        };
        assert_eq!(agent.profile(), "a1 (human-interface, java)");
    }
}
