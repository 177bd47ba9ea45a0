//! Execution flows and the step tree
//!
//! A flow is a typed container of steps. Steps are a tagged union keyed by
//! the wire `type` field; conditional and loop steps own child steps, and any
//! step may carry a nested flow, so a plan is a tree. Child step lists are
//! called scopes and are addressed with [`super::path::FlowPath`].
//!
//! Decoding goes through [`RawStep`], a permissive shape that accepts every
//! field any step kind may carry. The typed [`ExecutionStep`] is built from it
//! and rejects a variant that is missing its required payload.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;

use super::path::Scope;

/// Flow composition tag
///
/// Preserved verbatim: the engine interprets it, the console only shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlowType {
    Sequential,
    Parallel,
    Conditional,
    Loop,
    Hybrid,
    Other(String),
}

impl From<String> for FlowType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sequential" | "SEQUENTIAL" => Self::Sequential,
            "parallel" | "PARALLEL" => Self::Parallel,
            "conditional" | "CONDITIONAL" => Self::Conditional,
            "loop" | "LOOP" => Self::Loop,
            "hybrid" | "HYBRID" => Self::Hybrid,
            _ => Self::Other(value),
        }
    }
}

impl From<FlowType> for String {
    fn from(value: FlowType) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Conditional => write!(f, "conditional"),
            Self::Loop => write!(f, "loop"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::Other(other) => write!(f, "{}", other),
        }
    }
}

impl Default for FlowType {
    fn default() -> Self {
        Self::Sequential
    }
}

/// A typed, ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutionFlow {
    #[serde(rename = "type")]
    pub flow_type: FlowType,
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionFlow {
    pub fn new(flow_type: FlowType, steps: Vec<ExecutionStep>) -> Self {
        Self { flow_type, steps }
    }

    /// Count every step in the tree, nested scopes included
    pub fn total_steps(&self) -> usize {
        fn count(steps: &[&ExecutionStep]) -> usize {
            steps
                .iter()
                .map(|step| {
                    1 + step
                        .child_scopes()
                        .iter()
                        .map(|(_, children)| count(children))
                        .sum::<usize>()
                })
                .sum()
        }
        count(&self.steps.iter().collect::<Vec<_>>())
    }
}

/// Boolean expression evaluated by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Condition {
    pub expression: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

/// Condition on the wire: either `{expression, variables}` or a bare string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Text(String),
    Structured(Condition),
}

impl RawCondition {
    fn into_condition(self) -> Condition {
        match self {
            Self::Text(expression) => Condition {
                expression,
                variables: Vec::new(),
            },
            Self::Structured(condition) => condition,
        }
    }
}

/// Loop kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopType {
    #[serde(alias = "WHILE")]
    While,
    #[serde(alias = "FOR")]
    For,
    #[serde(alias = "FOREACH", alias = "for_each", alias = "FOR_EACH")]
    Foreach,
}

impl std::fmt::Display for LoopType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::While => write!(f, "while"),
            Self::For => write!(f, "for"),
            Self::Foreach => write!(f, "foreach"),
        }
    }
}

/// Loop termination rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitCondition {
    pub expression: String,

    /// Agent whose output the engine consults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_agent_id: Option<String>,

    /// Hard safety bound; shown to the operator, enforced by the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<i64>,
}

/// One branch of a parallel step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ParallelAgent {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
}

/// Retry rule, informational to the console
///
/// Both wire shapes are accepted: `{maxAttempts, delay, backoffMultiplier}`
/// and `{maxAttempts, initialDelayMs, maxDelayMs, backoffMultiplier, retryOn}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<RetryDelay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retry_on: Vec<String>,
}

/// Retry delay as sent by the engine: milliseconds, or text such as `"PT30S"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetryDelay {
    Millis(u64),
    Text(String),
}

impl std::fmt::Display for RetryDelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Millis(ms) => write!(f, "{}ms", ms),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: None,
            initial_delay_ms: None,
            max_delay_ms: None,
            backoff_multiplier: None,
            retry_on: Vec::new(),
        }
    }
}

/// Failure handling declared on a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorHandling {
    /// retry | continue | stop | custom
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_handler: Option<Value>,
}

/// Variant payload of a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Sequential {
        inputs: Option<Map<String, Value>>,
        outputs: Option<Vec<String>>,
    },
    Parallel {
        parallel_agents: Vec<ParallelAgent>,
        wait_for_all: bool,
    },
    Conditional {
        condition: Condition,
        then_step: Box<ExecutionStep>,
        else_step: Option<Box<ExecutionStep>>,
    },
    Loop {
        loop_type: LoopType,
        body: Vec<ExecutionStep>,
        exit_condition: ExitCondition,
        iteration_variable: Option<String>,
        collection_variable: Option<String>,
    },
    /// Any other engine step type (`task`, `subflow`, `hierarchical`, ...),
    /// kept under its original tag
    Task { type_name: String },
}

/// One unit of work in a flow
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStep {
    /// Unique within the enclosing scope only
    pub step_id: String,
    pub name: String,
    pub description: String,
    pub agent_id: Option<String>,
    pub instruction: Option<String>,
    pub action: Option<String>,
    pub input_mappings: Map<String, Value>,
    pub output_mappings: Map<String, Value>,
    pub parameters: Map<String, Value>,
    pub enabled: bool,
    pub dependencies: Vec<String>,
    pub timeout: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub human_approval_required: bool,
    /// Guard expression on non-conditional steps
    pub guard: Option<String>,
    pub error_handling: Option<ErrorHandling>,
    pub metadata: Map<String, Value>,
    pub flow: Option<ExecutionFlow>,
    pub kind: StepKind,
}

impl ExecutionStep {
    /// A task step with only an id and type, mostly for building fixtures
    pub fn task(step_id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::with_kind(
            step_id,
            StepKind::Task {
                type_name: type_name.into(),
            },
        )
    }

    /// A sequential step bound to an agent
    pub fn sequential(step_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let mut step = Self::with_kind(
            step_id,
            StepKind::Sequential {
                inputs: None,
                outputs: None,
            },
        );
        step.agent_id = Some(agent_id.into());
        step
    }

    pub fn with_kind(step_id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            step_id: step_id.into(),
            name: String::new(),
            description: String::new(),
            agent_id: None,
            instruction: None,
            action: None,
            input_mappings: Map::new(),
            output_mappings: Map::new(),
            parameters: Map::new(),
            enabled: true,
            dependencies: Vec::new(),
            timeout: None,
            retry_policy: None,
            human_approval_required: false,
            guard: None,
            error_handling: None,
            metadata: Map::new(),
            flow: None,
            kind,
        }
    }

    /// Wire `type` tag
    pub fn type_name(&self) -> &str {
        match &self.kind {
            StepKind::Sequential { .. } => "sequential",
            StepKind::Parallel { .. } => "parallel",
            StepKind::Conditional { .. } => "conditional",
            StepKind::Loop { .. } => "loop",
            StepKind::Task { type_name } => type_name,
        }
    }

    /// Name for display, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.step_id } else { &self.name }
    }

    /// Declared instruction, empty when absent
    pub fn declared_instruction(&self) -> &str {
        self.instruction.as_deref().unwrap_or_default()
    }

    /// Timeout as a duration; a bare number means seconds
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.as_deref().and_then(parse_timeout)
    }

    /// Child scopes in declaration order
    ///
    /// A nested `flow` comes first, then the variant's own children.
    pub fn child_scopes(&self) -> Vec<(Scope, Vec<&ExecutionStep>)> {
        let mut scopes = Vec::new();
        if let Some(flow) = &self.flow {
            scopes.push((Scope::Flow, flow.steps.iter().collect()));
        }
        match &self.kind {
            StepKind::Conditional {
                then_step, else_step, ..
            } => {
                scopes.push((Scope::Then, vec![then_step.as_ref()]));
                if let Some(else_step) = else_step {
                    scopes.push((Scope::Else, vec![else_step.as_ref()]));
                }
            }
            StepKind::Loop { body, .. } => scopes.push((Scope::Body, body.iter().collect())),
            StepKind::Sequential { .. } | StepKind::Parallel { .. } | StepKind::Task { .. } => {}
        }
        scopes
    }

    /// Steps of one child scope, if this step has it
    pub fn scope(&self, scope: Scope) -> Option<Vec<&ExecutionStep>> {
        self.child_scopes()
            .into_iter()
            .find(|(candidate, _)| *candidate == scope)
            .map(|(_, steps)| steps)
    }

    /// Every agent id this step references, with the field it came from
    pub fn agent_refs(&self) -> Vec<(&'static str, &str)> {
        let mut refs = Vec::new();
        if let Some(agent_id) = &self.agent_id {
            refs.push(("agentId", agent_id.as_str()));
        }
        match &self.kind {
            StepKind::Parallel { parallel_agents, .. } => {
                for branch in parallel_agents {
                    refs.push(("parallelAgents.agentId", branch.agent_id.as_str()));
                }
            }
            StepKind::Loop { exit_condition, .. } => {
                if let Some(check) = &exit_condition.check_agent_id {
                    refs.push(("exitCondition.checkAgentId", check.as_str()));
                }
            }
            StepKind::Sequential { .. } | StepKind::Conditional { .. } | StepKind::Task { .. } => {}
        }
        refs
    }
}

/// Parse `^\d+(s|m|h)?$` into a duration
pub fn parse_timeout(text: &str) -> Option<Duration> {
    let (digits, unit) = match text.char_indices().last()? {
        (idx, c) if c.is_ascii_alphabetic() => (&text[..idx], Some(c)),
        _ => (text, None),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    let secs = match unit {
        None | Some('s') => value,
        Some('m') => value.checked_mul(60)?,
        Some('h') => value.checked_mul(3600)?,
        Some(_) => return None,
    };
    Some(Duration::from_secs(secs))
}

/// `parameters` arrives either as an object or as an array; arrays become
/// objects keyed by index
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawParameters {
    Object(Map<String, Value>),
    List(Vec<Value>),
    Null(()),
}

impl RawParameters {
    fn into_map(self) -> Map<String, Value> {
        match self {
            Self::Object(map) => map,
            Self::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, value)| (idx.to_string(), value))
                .collect(),
            Self::Null(()) => Map::new(),
        }
    }
}

fn deserialize_parameters<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawParameters::deserialize(deserializer)?.into_map())
}

fn default_enabled() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Permissive wire shape accepting the fields of every step kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    #[serde(default)]
    step_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(rename = "type", default)]
    step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    input_mappings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    output_mappings: Map<String, Value>,
    #[serde(
        default,
        deserialize_with = "deserialize_parameters",
        skip_serializing_if = "Map::is_empty"
    )]
    parameters: Map<String, Value>,
    #[serde(default = "default_enabled", skip_serializing_if = "is_true")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_policy: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "is_false")]
    human_approval_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<RawCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_handling: Option<ErrorHandling>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flow: Option<ExecutionFlow>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    inputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outputs: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    parallel_agents: Option<Vec<ParallelAgent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_for_all: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    then_step: Option<Box<ExecutionStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    else_step: Option<Box<ExecutionStep>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    loop_type: Option<LoopType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<Vec<ExecutionStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exit_condition: Option<ExitCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iteration_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection_variable: Option<String>,
}

impl<'de> Deserialize<'de> for ExecutionStep {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawStep::deserialize(deserializer)?;
        let step_id = raw.step_id.clone();
        let missing = |field: &str| {
            D::Error::custom(format!(
                "{} step `{}` is missing required `{}`",
                raw.step_type, step_id, field
            ))
        };

        let mut guard = None;
        let kind = match raw.step_type.as_str() {
            "sequential" => StepKind::Sequential {
                inputs: raw.inputs.clone(),
                outputs: raw.outputs.clone(),
            },
            "parallel" => StepKind::Parallel {
                parallel_agents: raw.parallel_agents.clone().ok_or_else(|| missing("parallelAgents"))?,
                wait_for_all: raw.wait_for_all.unwrap_or(true),
            },
            "conditional" => StepKind::Conditional {
                condition: raw
                    .condition
                    .clone()
                    .ok_or_else(|| missing("condition"))?
                    .into_condition(),
                then_step: raw.then_step.clone().ok_or_else(|| missing("thenStep"))?,
                else_step: raw.else_step.clone(),
            },
            "loop" => StepKind::Loop {
                loop_type: raw.loop_type.ok_or_else(|| missing("loopType"))?,
                body: raw.body.clone().ok_or_else(|| missing("body"))?,
                exit_condition: raw.exit_condition.clone().ok_or_else(|| missing("exitCondition"))?,
                iteration_variable: raw.iteration_variable.clone(),
                collection_variable: raw.collection_variable.clone(),
            },
            "" => return Err(D::Error::custom(format!("step `{}` is missing required `type`", step_id))),
            other => StepKind::Task {
                type_name: other.to_string(),
            },
        };
        if !matches!(kind, StepKind::Conditional { .. }) {
            guard = raw.condition.map(|c| c.into_condition().expression);
        }

        Ok(Self {
            step_id: raw.step_id,
            name: raw.name,
            description: raw.description,
            agent_id: raw.agent_id,
            instruction: raw.instruction,
            action: raw.action,
            input_mappings: raw.input_mappings,
            output_mappings: raw.output_mappings,
            parameters: raw.parameters,
            enabled: raw.enabled,
            dependencies: raw.dependencies,
            timeout: raw.timeout,
            retry_policy: raw.retry_policy,
            human_approval_required: raw.human_approval_required,
            guard,
            error_handling: raw.error_handling,
            metadata: raw.metadata,
            flow: raw.flow,
            kind,
        })
    }
}

impl Serialize for ExecutionStep {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut raw = RawStep {
            step_id: self.step_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            step_type: self.type_name().to_string(),
            agent_id: self.agent_id.clone(),
            instruction: self.instruction.clone(),
            action: self.action.clone(),
            input_mappings: self.input_mappings.clone(),
            output_mappings: self.output_mappings.clone(),
            parameters: self.parameters.clone(),
            enabled: self.enabled,
            dependencies: self.dependencies.clone(),
            timeout: self.timeout.clone(),
            retry_policy: self.retry_policy.clone(),
            human_approval_required: self.human_approval_required,
            condition: self.guard.clone().map(RawCondition::Text),
            error_handling: self.error_handling.clone(),
            metadata: self.metadata.clone(),
            flow: self.flow.clone(),
            ..Default::default()
        };
        match &self.kind {
            StepKind::Sequential { inputs, outputs } => {
                raw.inputs = inputs.clone();
                raw.outputs = outputs.clone();
            }
            StepKind::Parallel {
                parallel_agents,
                wait_for_all,
            } => {
                raw.parallel_agents = Some(parallel_agents.clone());
                raw.wait_for_all = Some(*wait_for_all);
            }
            StepKind::Conditional {
                condition,
                then_step,
                else_step,
            } => {
                raw.condition = Some(RawCondition::Structured(condition.clone()));
                raw.then_step = Some(then_step.clone());
                raw.else_step = else_step.clone();
            }
            StepKind::Loop {
                loop_type,
                body,
                exit_condition,
                iteration_variable,
                collection_variable,
            } => {
                raw.loop_type = Some(*loop_type);
                raw.body = Some(body.clone());
                raw.exit_condition = Some(exit_condition.clone());
                raw.iteration_variable = iteration_variable.clone();
                raw.collection_variable = collection_variable.clone();
            }
            StepKind::Task { .. } => {}
        }
        raw.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(json: &str) -> Result<ExecutionStep, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn test_sequential_step() {
        let s = step(r#"{"stepId":"s1","name":"Fetch","type":"sequential","agentId":"a1","instruction":"go","outputs":["rows"]}"#)
            .unwrap();

        assert_eq!(s.type_name(), "sequential");
        assert_eq!(s.agent_id.as_deref(), Some("a1"));
        assert!(s.enabled);
        match s.kind {
            StepKind::Sequential { outputs, .. } => assert_eq!(outputs, Some(vec!["rows".to_string()])),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_parallel_defaults_wait_for_all() {
        let s = step(r#"{"stepId":"p","type":"parallel","parallelAgents":[{"agentId":"a1"},{"agentId":"a2"}]}"#).unwrap();
        match s.kind {
            StepKind::Parallel {
                parallel_agents,
                wait_for_all,
            } => {
                assert_eq!(parallel_agents.len(), 2);
                assert!(wait_for_all);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_parallel_missing_agents_rejected() {
        let err = step(r#"{"stepId":"p","type":"parallel"}"#).unwrap_err();
        assert!(err.to_string().contains("parallelAgents"));
    }

    #[test]
    fn test_conditional_accepts_bare_string_condition() {
        let s = step(
            r#"{"stepId":"c","type":"conditional","condition":"x > 1",
                "thenStep":{"stepId":"t","type":"task"}}"#,
        )
        .unwrap();
        match &s.kind {
            StepKind::Conditional {
                condition, else_step, ..
            } => {
                assert_eq!(condition.expression, "x > 1");
                assert!(else_step.is_none());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
        assert!(s.guard.is_none());
    }

    #[test]
    fn test_conditional_missing_then_rejected() {
        let err = step(r#"{"stepId":"c","type":"conditional","condition":{"expression":"x"}}"#).unwrap_err();
        assert!(err.to_string().contains("thenStep"));
    }

    #[test]
    fn test_loop_step() {
        let s = step(
            r#"{"stepId":"l","type":"loop","loopType":"FOREACH","body":[{"stepId":"b","type":"task"}],
                "exitCondition":{"expression":"done","checkAgentId":"a1","maxIterations":5},
                "iterationVariable":"item","collectionVariable":"items"}"#,
        )
        .unwrap();
        match &s.kind {
            StepKind::Loop {
                loop_type,
                body,
                exit_condition,
                iteration_variable,
                ..
            } => {
                assert_eq!(*loop_type, LoopType::Foreach);
                assert_eq!(body.len(), 1);
                assert_eq!(exit_condition.max_iterations, Some(5));
                assert_eq!(iteration_variable.as_deref(), Some("item"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_preserved() {
        let s = step(r#"{"stepId":"x","type":"hierarchical","condition":"ready"}"#).unwrap();
        assert_eq!(s.type_name(), "hierarchical");
        assert_eq!(s.guard.as_deref(), Some("ready"));

        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["type"], "hierarchical");
        assert_eq!(value["condition"], "ready");
    }

    #[test]
    fn test_missing_type_rejected() {
        assert!(step(r#"{"stepId":"x"}"#).is_err());
    }

    #[test]
    fn test_parameters_array_becomes_indexed_map() {
        let s = step(r#"{"stepId":"x","type":"task","parameters":["a","b"]}"#).unwrap();
        assert_eq!(s.parameters.get("0"), Some(&Value::from("a")));
        assert_eq!(s.parameters.get("1"), Some(&Value::from("b")));
    }

    #[test]
    fn test_nested_flow_and_scopes() {
        let s = step(
            r#"{"stepId":"l","type":"loop","loopType":"while","body":[{"stepId":"b1","type":"task"}],
                "exitCondition":{"expression":"done"},
                "flow":{"type":"parallel","steps":[{"stepId":"n1","type":"task"}]}}"#,
        )
        .unwrap();
        let scopes = s.child_scopes();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].0, Scope::Flow);
        assert_eq!(scopes[1].0, Scope::Body);
        assert_eq!(s.scope(Scope::Body).unwrap()[0].step_id, "b1");
        assert!(s.scope(Scope::Then).is_none());
    }

    #[test]
    fn test_serialize_keeps_variant_payload() {
        let s = step(
            r#"{"stepId":"c","type":"conditional","condition":{"expression":"ok","variables":["v"]},
                "thenStep":{"stepId":"t","type":"task"},"elseStep":{"stepId":"e","type":"task"}}"#,
        )
        .unwrap();
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["condition"]["expression"], "ok");
        assert_eq!(value["elseStep"]["stepId"], "e");
        assert!(value.get("enabled").is_none());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_timeout("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_timeout("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_timeout("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_timeout("m"), None);
        assert_eq!(parse_timeout("5d"), None);
        assert_eq!(parse_timeout("1.5s"), None);
        assert_eq!(parse_timeout(""), None);
    }

    #[test]
    fn test_total_steps_counts_nested() {
        let flow: ExecutionFlow = serde_json::from_str(
            r#"{"type":"sequential","steps":[
                {"stepId":"a","type":"task"},
                {"stepId":"c","type":"conditional","condition":"x",
                 "thenStep":{"stepId":"t","type":"task"},"elseStep":{"stepId":"e","type":"task"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(flow.total_steps(), 4);
    }

    #[test]
    fn test_retry_delay_accepts_number_and_text() {
        let s = step(r#"{"stepId":"s1","type":"task","retryPolicy":{"maxAttempts":3,"delay":1000}}"#).unwrap();
        let retry = s.retry_policy.unwrap();
        assert_eq!(retry.delay, Some(RetryDelay::Millis(1000)));
        assert_eq!(retry.delay.unwrap().to_string(), "1000ms");

        let s = step(r#"{"stepId":"s1","type":"task","retryPolicy":{"maxAttempts":2,"delay":"PT30S"}}"#).unwrap();
        let retry = s.retry_policy.unwrap();
        assert_eq!(retry.delay, Some(RetryDelay::Text("PT30S".to_string())));
        assert_eq!(retry.max_attempts, 2);
    }
}
