//! Path-based step addressing
//!
//! Step ids are unique only within their enclosing scope, so a step is named by
//! the pair (flow path, step id). A [`FlowPath`] is the list of hops from the
//! root flow; each hop names a step and the child scope entered under it.
//! Textual form: `loop1:body/cond1:then`, root is the empty string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::flow::{ExecutionFlow, ExecutionStep};

/// Child scope of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Nested `flow.steps`
    Flow,
    /// Loop `body`
    Body,
    /// Conditional `thenStep`
    Then,
    /// Conditional `elseStep`
    Else,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow => write!(f, "flow"),
            Self::Body => write!(f, "body"),
            Self::Then => write!(f, "then"),
            Self::Else => write!(f, "else"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow" => Ok(Self::Flow),
            "body" => Ok(Self::Body),
            "then" => Ok(Self::Then),
            "else" => Ok(Self::Else),
            _ => Err(format!("Unknown scope: {}. Use: flow, body, then, or else", s)),
        }
    }
}

/// One hop: the step entered and the scope entered under it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowSegment {
    pub step_id: String,
    pub scope: Scope,
}

/// Hops from the root flow to a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowPath(Vec<FlowSegment>);

impl FlowPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[FlowSegment] {
        &self.0
    }

    /// Path one hop deeper
    pub fn child(&self, step_id: impl Into<String>, scope: Scope) -> Self {
        let mut segments = self.0.clone();
        segments.push(FlowSegment {
            step_id: step_id.into(),
            scope,
        });
        Self(segments)
    }

    /// Steps of the scope this path names, or `None` if any hop is missing
    pub fn resolve<'a>(&self, flow: &'a ExecutionFlow) -> Option<Vec<&'a ExecutionStep>> {
        let mut steps: Vec<&ExecutionStep> = flow.steps.iter().collect();
        for segment in &self.0 {
            let step: &'a ExecutionStep = *steps.iter().find(|s| s.step_id == segment.step_id)?;
            steps = step.scope(segment.scope)?;
        }
        Some(steps)
    }
}

impl fmt::Display for FlowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|segment| format!("{}:{}", segment.step_id, segment.scope))
            .collect();
        write!(f, "{}", parts.join("/"))
    }
}

impl FromStr for FlowPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::root());
        }
        let segments = s
            .split('/')
            .map(|part| {
                let (step_id, scope) = part
                    .rsplit_once(':')
                    .ok_or_else(|| format!("Invalid path segment '{}': expected <stepId>:<scope>", part))?;
                if step_id.is_empty() {
                    return Err(format!("Invalid path segment '{}': empty step id", part));
                }
                Ok(FlowSegment {
                    step_id: step_id.to_string(),
                    scope: scope.parse()?,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self(segments))
    }
}

impl TryFrom<String> for FlowPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FlowPath> for String {
    fn from(value: FlowPath) -> Self {
        value.to_string()
    }
}

/// Identity of a step: (flow path, step id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepKey {
    pub flow: FlowPath,
    pub step_id: String,
}

impl StepKey {
    pub fn new(flow: FlowPath, step_id: impl Into<String>) -> Self {
        Self {
            flow,
            step_id: step_id.into(),
        }
    }

    /// Key of a top-level step
    pub fn top(step_id: impl Into<String>) -> Self {
        Self::new(FlowPath::root(), step_id)
    }

    /// Find the addressed step
    pub fn resolve<'a>(&self, flow: &'a ExecutionFlow) -> Option<&'a ExecutionStep> {
        self.flow
            .resolve(flow)?
            .into_iter()
            .find(|step| step.step_id == self.step_id)
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flow.is_root() {
            write!(f, "{}", self.step_id)
        } else {
            write!(f, "{}/{}", self.flow, self.step_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flow() -> ExecutionFlow {
        serde_json::from_str(
            r#"{"type":"sequential","steps":[
                {"stepId":"s1","type":"sequential","agentId":"a1"},
                {"stepId":"loop1","type":"loop","loopType":"while",
                 "exitCondition":{"expression":"done"},
                 "body":[
                    {"stepId":"s1","type":"task"},
                    {"stepId":"cond1","type":"conditional","condition":"x",
                     "thenStep":{"stepId":"inner","type":"task"}}
                 ]}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_path_display_and_parse() {
        let path = FlowPath::root().child("loop1", Scope::Body).child("cond1", Scope::Then);
        assert_eq!(path.to_string(), "loop1:body/cond1:then");
        assert_eq!("loop1:body/cond1:then".parse::<FlowPath>().unwrap(), path);
        assert_eq!("".parse::<FlowPath>().unwrap(), FlowPath::root());
    }

    #[test]
    fn test_path_parse_errors() {
        assert!("loop1".parse::<FlowPath>().is_err());
        assert!("loop1:inside".parse::<FlowPath>().is_err());
        assert!(":body".parse::<FlowPath>().is_err());
    }

    #[test]
    fn test_same_id_in_different_scopes() {
        let flow = sample_flow();
        let top = StepKey::top("s1").resolve(&flow).unwrap();
        let nested = StepKey::new(FlowPath::root().child("loop1", Scope::Body), "s1")
            .resolve(&flow)
            .unwrap();

        assert_eq!(top.type_name(), "sequential");
        assert_eq!(nested.type_name(), "task");
    }

    #[test]
    fn test_resolve_then_scope() {
        let flow = sample_flow();
        let path: FlowPath = "loop1:body/cond1:then".parse().unwrap();
        let key = StepKey::new(path, "inner");
        assert!(key.resolve(&flow).is_some());
        assert_eq!(key.to_string(), "loop1:body/cond1:then/inner");
    }

    #[test]
    fn test_resolve_missing_scope() {
        let flow = sample_flow();
        let path: FlowPath = "loop1:body/cond1:else".parse().unwrap();
        assert!(path.resolve(&flow).is_none());
        assert!(StepKey::top("nope").resolve(&flow).is_none());
    }

    #[test]
    fn test_step_key_serde() {
        let key = StepKey::new("loop1:body".parse().unwrap(), "s1");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"flow":"loop1:body","stepId":"s1"}"#);
    }
}
