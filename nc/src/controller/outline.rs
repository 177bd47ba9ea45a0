//! Flattened view of a step tree
//!
//! Rows are produced depth-first in declaration order. Both the CLI `show`
//! output and the TUI detail panel render them.

use serde::Serialize;

use crate::domain::{Agent, ExecutionStep, FlowPath, Scope, StepKey, StepKind};

/// One rendered line of the outline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineRow {
    /// Nesting depth, 0 for the steps of the scope being outlined
    pub depth: usize,
    pub key: StepKey,
    /// Scope this row was entered through, `None` at the outline root
    pub scope: Option<Scope>,
    pub name: String,
    pub step_type: String,
    /// Agent name when the id resolves, the bare id otherwise
    pub agent: Option<String>,
    pub disabled: bool,
    pub approval: bool,
    /// Variant detail: branches, condition, loop bound
    pub detail: Option<String>,
}

/// Outline every step under `steps`, which live at `path`
pub fn outline(steps: &[&ExecutionStep], path: &FlowPath, agents: &[Agent]) -> Vec<OutlineRow> {
    let mut rows = Vec::new();
    walk(steps, path, None, 0, agents, &mut rows);
    rows
}

fn walk(
    steps: &[&ExecutionStep],
    path: &FlowPath,
    scope: Option<Scope>,
    depth: usize,
    agents: &[Agent],
    rows: &mut Vec<OutlineRow>,
) {
    for step in steps {
        rows.push(row(step, path, scope, depth, agents));
        for (child_scope, children) in step.child_scopes() {
            let child_path = path.child(step.step_id.clone(), child_scope);
            walk(&children, &child_path, Some(child_scope), depth + 1, agents, rows);
        }
    }
}

fn row(step: &ExecutionStep, path: &FlowPath, scope: Option<Scope>, depth: usize, agents: &[Agent]) -> OutlineRow {
    let agent = step.agent_id.as_deref().map(|id| agent_label(id, agents));
    OutlineRow {
        depth,
        key: StepKey::new(path.clone(), step.step_id.clone()),
        scope,
        name: step.display_name().to_string(),
        step_type: step.type_name().to_string(),
        agent,
        disabled: !step.enabled,
        approval: step.human_approval_required,
        detail: detail(step, agents),
    }
}

fn agent_label(agent_id: &str, agents: &[Agent]) -> String {
    agents
        .iter()
        .find(|a| a.agent_id == agent_id)
        .map(|a| a.display_name().to_string())
        .unwrap_or_else(|| agent_id.to_string())
}

/// Variant-specific summary
pub fn detail(step: &ExecutionStep, agents: &[Agent]) -> Option<String> {
    let mut parts = Vec::new();
    match &step.kind {
        StepKind::Sequential { outputs, .. } => {
            if let Some(outputs) = outputs {
                if !outputs.is_empty() {
                    parts.push(format!("outputs: {}", outputs.join(", ")));
                }
            }
        }
        StepKind::Parallel {
            parallel_agents,
            wait_for_all,
        } => {
            let branches: Vec<String> = parallel_agents
                .iter()
                .map(|branch| agent_label(&branch.agent_id, agents))
                .collect();
            parts.push(format!("branches: {}", branches.join(", ")));
            parts.push(format!("waitForAll: {}", wait_for_all));
        }
        StepKind::Conditional { condition, else_step, .. } => {
            parts.push(format!("if {}", condition.expression));
            if else_step.is_none() {
                parts.push("no else".to_string());
            }
        }
        StepKind::Loop {
            loop_type,
            exit_condition,
            collection_variable,
            iteration_variable,
            ..
        } => {
            let mut head = loop_type.to_string();
            if let (Some(item), Some(collection)) = (iteration_variable, collection_variable) {
                head = format!("{} {} in {}", head, item, collection);
            }
            parts.push(format!("{} until {}", head, exit_condition.expression));
            match exit_condition.max_iterations {
                Some(max) => parts.push(format!("maxIterations: {}", max)),
                None => parts.push("no iteration bound".to_string()),
            }
        }
        StepKind::Task { .. } => {}
    }
    if let Some(guard) = &step.guard {
        parts.push(format!("when {}", guard));
    }
    if let Some(timeout) = &step.timeout {
        parts.push(format!("timeout: {}", timeout));
    }
    if !step.dependencies.is_empty() {
        parts.push(format!("after: {}", step.dependencies.join(", ")));
    }

    if parts.is_empty() { None } else { Some(parts.join("; ")) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FlowDocument;

    fn document() -> FlowDocument {
        serde_json::from_str(
            r#"{
                "planId": "P1",
                "planName": "Nightly",
                "agents": [{"agentId": "A1", "name": "Fetcher", "type": "data", "language": "python"}],
                "executionFlow": {"type": "hybrid", "steps": [
                    {"stepId": "S1", "type": "sequential", "agentId": "A1", "timeout": "30s"},
                    {"stepId": "P", "type": "parallel", "waitForAll": false,
                     "parallelAgents": [{"agentId": "A1"}, {"agentId": "A9"}]},
                    {"stepId": "L", "type": "loop", "loopType": "while",
                     "exitCondition": {"expression": "done", "maxIterations": 5},
                     "body": [
                        {"stepId": "C", "type": "conditional", "condition": "x > 1",
                         "thenStep": {"stepId": "T", "type": "task", "enabled": false}}
                     ]}
                ]}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_outline_depth_first() {
        let doc = document();
        let steps: Vec<&ExecutionStep> = doc.execution_flow.steps.iter().collect();
        let rows = outline(&steps, &FlowPath::root(), &doc.agents);

        let keys: Vec<String> = rows.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["S1", "P", "L", "L:body/C", "L:body/C:then/T"]);
        let depths: Vec<usize> = rows.iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 0, 0, 1, 2]);
        assert_eq!(rows[3].scope, Some(Scope::Body));
        assert!(rows[4].disabled);
    }

    #[test]
    fn test_outline_details() {
        let doc = document();
        let steps: Vec<&ExecutionStep> = doc.execution_flow.steps.iter().collect();
        let rows = outline(&steps, &FlowPath::root(), &doc.agents);

        assert_eq!(rows[0].agent.as_deref(), Some("Fetcher"));
        assert_eq!(rows[0].detail.as_deref(), Some("timeout: 30s"));

        let parallel = rows[1].detail.as_deref().unwrap();
        assert!(parallel.contains("branches: Fetcher, A9"));
        assert!(parallel.contains("waitForAll: false"));

        let looped = rows[2].detail.as_deref().unwrap();
        assert!(looped.starts_with("while until done"));
        assert!(looped.contains("maxIterations: 5"));

        assert_eq!(rows[3].detail.as_deref(), Some("if x > 1; no else"));
        assert_eq!(rows[4].step_type, "task");
        assert!(rows[4].detail.is_none());
    }

    #[test]
    fn test_outline_rows_serialize_scope() {
        let doc = document();
        let steps: Vec<&ExecutionStep> = doc.execution_flow.steps.iter().collect();
        let rows = outline(&steps, &FlowPath::root(), &doc.agents);

        let json = serde_json::to_value(&rows).unwrap();
        assert!(json[0]["scope"].is_null());
        assert_eq!(json[3]["scope"], "body");
        assert_eq!(json[4]["scope"], "then");
        assert_eq!(json[4]["stepType"], "task");
    }
}
