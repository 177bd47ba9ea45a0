//! Structural validation of plan documents
//!
//! Validation walks the whole step tree and collects every issue with its
//! location instead of stopping at the first. Expressions are only checked for
//! presence; evaluating them is the engine's job.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::agent::Agent;
use super::flow::{ExecutionFlow, ExecutionStep, StepKind, parse_timeout};
use super::path::{FlowPath, StepKey};
use super::plan::{ExecutionPlan, FlowDocument};

/// One problem found in a plan document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// `plan`, `metadata.name`, `agents[2]`, or a step key like `loop1:body/s2`
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// A malformed plan document, rejected before render
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid plan document: {}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::new(location, message)],
        }
    }

    /// A document that could not be decoded at all
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::single("document", err.to_string())
    }

    fn from_issues(issues: Vec<ValidationIssue>) -> Result<(), Self> {
        if issues.is_empty() { Ok(()) } else { Err(Self { issues }) }
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    match issues {
        [] => "no issues".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

/// Decode a plan from JSON or YAML text and validate it
pub fn parse_plan(text: &str) -> Result<ExecutionPlan, ValidationError> {
    let plan: ExecutionPlan = if text.trim_start().starts_with('{') {
        serde_json::from_str(text).map_err(ValidationError::decode)?
    } else {
        serde_yaml::from_str(text).map_err(ValidationError::decode)?
    };
    validate_plan(&plan)?;
    Ok(plan)
}

/// Decode a flow endpoint response and validate it
pub fn parse_flow_document(bytes: &[u8]) -> Result<FlowDocument, ValidationError> {
    let doc: FlowDocument = serde_json::from_slice(bytes).map_err(ValidationError::decode)?;
    validate_flow_document(&doc)?;
    Ok(doc)
}

/// Validate a whole plan
pub fn validate_plan(plan: &ExecutionPlan) -> Result<(), ValidationError> {
    debug!(plan_id = %plan.plan_id, "validate_plan: called");
    let mut issues = Vec::new();

    if plan.plan_id.trim().is_empty() {
        issues.push(ValidationIssue::new("planId", "must not be empty"));
    }
    if plan.metadata.name.trim().is_empty() {
        issues.push(ValidationIssue::new("metadata.name", "must not be empty"));
    }
    check_agents(&plan.agents, &mut issues);
    issues.extend(validate_flow(&plan.execution_flow, &plan.agents));

    if let Some(hitl) = &plan.human_in_the_loop {
        let known = collect_step_ids(&plan.execution_flow);
        for step_id in &hitl.approval_required {
            if !known.contains(step_id.as_str()) {
                issues.push(ValidationIssue::new(
                    "humanInTheLoop.approvalRequired",
                    format!("step '{}' does not exist in the plan", step_id),
                ));
            }
        }
    }

    debug!(plan_id = %plan.plan_id, issues = issues.len(), "validate_plan: done");
    ValidationError::from_issues(issues)
}

/// Validate what the flow endpoint returned
pub fn validate_flow_document(doc: &FlowDocument) -> Result<(), ValidationError> {
    debug!(plan_id = %doc.plan_id, "validate_flow_document: called");
    let mut issues = Vec::new();
    if doc.plan_id.trim().is_empty() {
        issues.push(ValidationIssue::new("planId", "must not be empty"));
    }
    check_agents(&doc.agents, &mut issues);
    issues.extend(validate_flow(&doc.execution_flow, &doc.agents));
    ValidationError::from_issues(issues)
}

/// Validate a flow tree against the declared agents
pub fn validate_flow(flow: &ExecutionFlow, agents: &[Agent]) -> Vec<ValidationIssue> {
    let agent_ids: HashSet<&str> = agents.iter().map(|a| a.agent_id.as_str()).collect();
    let mut issues = Vec::new();
    let steps: Vec<&ExecutionStep> = flow.steps.iter().collect();
    validate_scope(&steps, &FlowPath::root(), &agent_ids, &mut issues);
    issues
}

fn check_agents(agents: &[Agent], issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for (idx, agent) in agents.iter().enumerate() {
        if agent.agent_id.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("agents[{}]", idx), "agentId must not be empty"));
        } else if !seen.insert(agent.agent_id.as_str()) {
            issues.push(ValidationIssue::new(
                format!("agents[{}]", idx),
                format!("duplicate agentId '{}'", agent.agent_id),
            ));
        }
    }
}

fn collect_step_ids(flow: &ExecutionFlow) -> HashSet<&str> {
    fn walk<'a>(steps: &[&'a ExecutionStep], out: &mut HashSet<&'a str>) {
        for step in steps {
            out.insert(step.step_id.as_str());
            for (_, children) in step.child_scopes() {
                walk(&children, out);
            }
        }
    }
    let mut out = HashSet::new();
    walk(&flow.steps.iter().collect::<Vec<_>>(), &mut out);
    out
}

fn validate_scope(steps: &[&ExecutionStep], path: &FlowPath, agents: &HashSet<&str>, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for step in steps {
        let key = StepKey::new(path.clone(), step.step_id.clone());
        let location = key.to_string();

        if step.step_id.trim().is_empty() {
            issues.push(ValidationIssue::new(
                if path.is_root() { "step".to_string() } else { format!("{}/step", path) },
                "stepId must not be empty",
            ));
        } else {
            if !is_valid_step_id(&step.step_id) {
                issues.push(ValidationIssue::new(
                    &location,
                    "stepId may only contain letters, digits, '-' and '_'",
                ));
            }
            if !seen.insert(step.step_id.as_str()) {
                issues.push(ValidationIssue::new(&location, "duplicate stepId in this flow"));
            }
        }

        check_step(step, &location, agents, issues);

        for dep in &step.dependencies {
            if !steps.iter().any(|s| &s.step_id == dep) {
                issues.push(ValidationIssue::new(
                    &location,
                    format!("dependency '{}' is not a step in the same flow", dep),
                ));
            }
        }

        for (scope, children) in step.child_scopes() {
            validate_scope(&children, &path.child(step.step_id.clone(), scope), agents, issues);
        }
    }

    if let Err(cycle) = validate_dependency_graph(steps) {
        let location = if path.is_root() { "flow".to_string() } else { path.to_string() };
        issues.push(ValidationIssue::new(
            location,
            format!("dependency cycle: {}", cycle.join(" -> ")),
        ));
    }
}

fn check_step(step: &ExecutionStep, location: &str, agents: &HashSet<&str>, issues: &mut Vec<ValidationIssue>) {
    for (field, agent_id) in step.agent_refs() {
        if agent_id.trim().is_empty() {
            // An empty step agentId on a sequential step is reported below
            if field != "agentId" || !matches!(step.kind, StepKind::Sequential { .. }) {
                issues.push(ValidationIssue::new(location, format!("{} must not be empty", field)));
            }
        } else if !agents.contains(agent_id) {
            issues.push(ValidationIssue::new(
                location,
                format!("{} '{}' does not match a declared agent", field, agent_id),
            ));
        }
    }

    if let Some(timeout) = &step.timeout {
        if parse_timeout(timeout).is_none() {
            issues.push(ValidationIssue::new(
                location,
                format!("timeout '{}' must be a number with optional s, m or h suffix", timeout),
            ));
        }
    }

    if let Some(retry) = &step.retry_policy {
        if retry.max_attempts < 1 {
            issues.push(ValidationIssue::new(location, "retryPolicy.maxAttempts must be at least 1"));
        }
        if retry.backoff_multiplier.is_some_and(|m| !(m >= 1.0)) {
            issues.push(ValidationIssue::new(
                location,
                "retryPolicy.backoffMultiplier must be at least 1",
            ));
        }
    }

    match &step.kind {
        StepKind::Sequential { .. } => {
            if step.agent_id.as_deref().is_none_or(str::is_empty) {
                issues.push(ValidationIssue::new(location, "sequential step requires an agentId"));
            }
        }
        StepKind::Parallel { parallel_agents, .. } => {
            if parallel_agents.is_empty() {
                issues.push(ValidationIssue::new(location, "parallelAgents must not be empty"));
            }
        }
        StepKind::Conditional { condition, .. } => {
            if condition.expression.trim().is_empty() {
                issues.push(ValidationIssue::new(location, "condition.expression must not be empty"));
            }
        }
        StepKind::Loop {
            body, exit_condition, ..
        } => {
            if body.is_empty() {
                issues.push(ValidationIssue::new(location, "loop body must not be empty"));
            }
            if exit_condition.expression.trim().is_empty() {
                issues.push(ValidationIssue::new(location, "exitCondition.expression must not be empty"));
            }
            if let Some(max) = exit_condition.max_iterations {
                if max <= 0 {
                    issues.push(ValidationIssue::new(
                        location,
                        format!("exitCondition.maxIterations must be positive, got {}", max),
                    ));
                }
            }
        }
        StepKind::Task { .. } => {}
    }
}

/// Step ids appear in textual flow paths, so they are limited to `[A-Za-z0-9_-]`
fn is_valid_step_id(step_id: &str) -> bool {
    step_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Detect a dependency cycle among sibling steps
///
/// Returns the cycle as a list of step ids, first and last equal, with any
/// steps leading into it left out.
pub fn validate_dependency_graph(steps: &[&ExecutionStep]) -> Result<(), Vec<String>> {
    let graph: HashMap<&str, &ExecutionStep> = steps.iter().map(|s| (s.step_id.as_str(), *s)).collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut cycle_path = Vec::new();

    for step in steps {
        let id = step.step_id.as_str();
        if !visited.contains(id) && has_cycle_dfs(id, &graph, &mut visited, &mut rec_stack, &mut cycle_path) {
            // Drop the path that led into the cycle
            let start = cycle_path
                .last()
                .and_then(|repeated| cycle_path.iter().position(|s| s == repeated))
                .unwrap_or(0);
            return Err(cycle_path.split_off(start));
        }
    }

    Ok(())
}

fn has_cycle_dfs<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, &'a ExecutionStep>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    cycle_path: &mut Vec<String>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    cycle_path.push(node.to_string());

    if let Some(step) = graph.get(node) {
        for dep in &step.dependencies {
            let dep = dep.as_str();
            if !visited.contains(dep) {
                if let Some((&dep_key, _)) = graph.get_key_value(dep) {
                    if has_cycle_dfs(dep_key, graph, visited, rec_stack, cycle_path) {
                        return true;
                    }
                }
            } else if rec_stack.contains(dep) {
                cycle_path.push(dep.to_string());
                return true;
            }
        }
    }

    rec_stack.remove(node);
    cycle_path.pop();
    false
}
