use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ConfigurationError;
use crate::template;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "not_equals")]
    NotEquals,
    #[serde(rename = "gt")]
    GreaterThan,
    #[serde(rename = "lt")]
    LessThan,
    #[serde(rename = "gte")]
    GreaterOrEqual,
    #[serde(rename = "lte")]
    LessOrEqual,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "exists")]
    Exists,
}

/// Comparison of one session variable against a literal.
///
/// `variable` is a dot-separated path, so `forecast.error` reads the `error`
/// field of the value bound under `forecast`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(variable: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self { variable: variable.into(), operator, value }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMode {
    #[default]
    All,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Prompt,
    Condition,
    ToolCall,
    End,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Condition => "condition",
            Self::ToolCall => "tool_call",
            Self::End => "end",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Prompt {
        text: String,
        #[serde(default)]
        store_as: Option<String>,
    },
    Condition {
        conditions: Vec<Condition>,
        #[serde(default)]
        mode: ConditionMode,
        #[serde(default)]
        on_true: Option<StepId>,
        #[serde(default)]
        on_false: Option<StepId>,
    },
    ToolCall {
        tool: String,
        #[serde(default)]
        arguments: Map<String, Value>,
        result_key: String,
    },
    End {
        #[serde(default)]
        message: Option<String>,
    },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Prompt { .. } => StepKind::Prompt,
            Self::Condition { .. } => StepKind::Condition,
            Self::ToolCall { .. } => StepKind::ToolCall,
            Self::End { .. } => StepKind::End,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub id: StepId,
    #[serde(flatten)]
    pub action: StepAction,
}

impl ProtocolStep {
    pub fn prompt(id: &str, text: impl Into<String>, store_as: Option<&str>) -> Self {
        Self {
            id: id.into(),
            action: StepAction::Prompt { text: text.into(), store_as: store_as.map(str::to_string) },
        }
    }

    pub fn condition(
        id: &str,
        conditions: Vec<Condition>,
        mode: ConditionMode,
        on_true: Option<&str>,
        on_false: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            action: StepAction::Condition {
                conditions,
                mode,
                on_true: on_true.map(StepId::from),
                on_false: on_false.map(StepId::from),
            },
        }
    }

    pub fn tool_call(
        id: &str,
        tool: impl Into<String>,
        arguments: Map<String, Value>,
        result_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            action: StepAction::ToolCall {
                tool: tool.into(),
                arguments,
                result_key: result_key.into(),
            },
        }
    }

    pub fn end(id: &str, message: Option<&str>) -> Self {
        Self { id: id.into(), action: StepAction::End { message: message.map(str::to_string) } }
    }
}

/// An ordered script of steps.
///
/// Steps run in sequence; only condition steps jump elsewhere. Walking past
/// the last step ends the protocol the same way an `end` step does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<ProtocolStep>,
}

impl Protocol {
    pub fn new(name: impl Into<String>, steps: Vec<ProtocolStep>) -> Self {
        Self { name: name.into(), description: None, steps }
    }

    pub fn first_step(&self) -> Option<&ProtocolStep> {
        self.steps.first()
    }

    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|step| &step.id == id)
    }

    pub fn step(&self, id: &StepId) -> Option<(usize, &ProtocolStep)> {
        self.position(id).map(|index| (index, &self.steps[index]))
    }

    /// Id of the step that follows `index` in sequence, if any.
    pub fn next_after(&self, index: usize) -> Option<&StepId> {
        self.steps.get(index + 1).map(|step| &step.id)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.steps.is_empty() {
            return Err(ConfigurationError::EmptyProtocol { protocol: self.name.clone() });
        }

        let mut positions = HashMap::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            if positions.insert(step.id.0.as_str(), index).is_some() {
                return Err(ConfigurationError::DuplicateStep {
                    protocol: self.name.clone(),
                    step: step.id.0.clone(),
                });
            }
        }

        for step in &self.steps {
            match &step.action {
                StepAction::Prompt { text, .. } => self.check_template(step, text)?,
                StepAction::End { message: Some(message) } => self.check_template(step, message)?,
                StepAction::End { message: None } | StepAction::ToolCall { .. } => {}
                StepAction::Condition { on_true, on_false, .. } => {
                    for target in [on_true, on_false].into_iter().flatten() {
                        if !positions.contains_key(target.as_str()) {
                            return Err(ConfigurationError::UnknownStepReference {
                                protocol: self.name.clone(),
                                step: step.id.0.clone(),
                                target: target.0.clone(),
                            });
                        }
                    }
                }
            }
        }

        if !self.end_is_reachable(&positions) {
            return Err(ConfigurationError::NoReachableEnd { protocol: self.name.clone() });
        }

        Ok(())
    }

    fn check_template(&self, step: &ProtocolStep, text: &str) -> Result<(), ConfigurationError> {
        template::check_syntax(text).map_err(|message| ConfigurationError::InvalidTemplate {
            location: format!("{}.{}", self.name, step.id),
            message,
        })
    }

    fn end_is_reachable(&self, positions: &HashMap<&str, usize>) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([0usize]);

        while let Some(index) = queue.pop_front() {
            // Running off the end of the step list terminates the walk.
            let Some(step) = self.steps.get(index) else {
                return true;
            };
            if !visited.insert(index) {
                continue;
            }

            match &step.action {
                StepAction::End { .. } => return true,
                StepAction::Prompt { .. } | StepAction::ToolCall { .. } => {
                    queue.push_back(index + 1)
                }
                StepAction::Condition { on_true, on_false, .. } => {
                    for target in [on_true, on_false] {
                        let next = target
                            .as_ref()
                            .and_then(|id| positions.get(id.as_str()).copied())
                            .unwrap_or(index + 1);
                        queue.push_back(next);
                    }
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{
        Condition, ConditionMode, ConditionOperator, Protocol, ProtocolStep, StepAction, StepId,
        StepKind,
    };
    use crate::errors::ConfigurationError;

    fn gate(on_true: Option<&str>, on_false: Option<&str>) -> ProtocolStep {
        ProtocolStep::condition(
            "gate",
            vec![Condition::new("answer", ConditionOperator::Equals, json!("yes"))],
            ConditionMode::All,
            on_true,
            on_false,
        )
    }

    #[test]
    fn valid_protocol_passes_validation() {
        let protocol = Protocol::new(
            "onboarding",
            vec![
                ProtocolStep::prompt("ask", "Continue?", Some("answer")),
                gate(None, Some("bye")),
                ProtocolStep::tool_call("lookup", "echo", Map::new(), "echoed"),
                ProtocolStep::end("bye", Some("Goodbye {{ user_id }}")),
            ],
        );

        protocol.validate().expect("protocol should be valid");
        assert_eq!(protocol.next_after(0), Some(&StepId::from("gate")));
        assert_eq!(protocol.next_after(3), None);
        assert_eq!(protocol.steps[2].action.kind(), StepKind::ToolCall);
    }

    #[test]
    fn unknown_branch_target_is_rejected() {
        let protocol = Protocol::new(
            "broken",
            vec![gate(None, Some("missing")), ProtocolStep::end("done", None)],
        );

        let error = protocol.validate().expect_err("unknown target must fail");
        assert_eq!(
            error,
            ConfigurationError::UnknownStepReference {
                protocol: "broken".to_string(),
                step: "gate".to_string(),
                target: "missing".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_step_ids_are_rejected() {
        let protocol = Protocol::new(
            "dupes",
            vec![ProtocolStep::prompt("ask", "One", None), ProtocolStep::prompt("ask", "Two", None)],
        );

        assert!(matches!(protocol.validate(), Err(ConfigurationError::DuplicateStep { .. })));
    }

    #[test]
    fn empty_protocol_is_rejected() {
        let protocol = Protocol::new("empty", Vec::new());
        assert!(matches!(protocol.validate(), Err(ConfigurationError::EmptyProtocol { .. })));
    }

    #[test]
    fn closed_loop_without_exit_is_rejected() {
        let protocol = Protocol::new("spin", vec![gate(Some("gate"), Some("gate"))]);
        assert!(matches!(protocol.validate(), Err(ConfigurationError::NoReachableEnd { .. })));
    }

    #[test]
    fn malformed_prompt_template_is_rejected() {
        let protocol = Protocol::new("bad_template", vec![ProtocolStep::prompt("ask", "Hi {{", None)]);
        assert!(matches!(protocol.validate(), Err(ConfigurationError::InvalidTemplate { .. })));
    }

    #[test]
    fn steps_deserialize_from_tagged_toml() {
        let protocol: Protocol = toml::from_str(
            r#"
name = "weather"

[[steps]]
id = "ask_city"
action = "prompt"
text = "Which city?"
store_as = "city"

[[steps]]
id = "lookup"
action = "tool_call"
tool = "weather"
result_key = "forecast"
arguments = { city = "$city", days = 3 }

[[steps]]
id = "check"
action = "condition"
mode = "any"
on_false = "done"
conditions = [{ variable = "forecast.error", operator = "exists" }]

[[steps]]
id = "done"
action = "end"
"#,
        )
        .expect("protocol should parse");

        protocol.validate().expect("parsed protocol should be valid");
        assert_eq!(protocol.steps.len(), 4);
        match &protocol.steps[1].action {
            StepAction::ToolCall { tool, arguments, result_key } => {
                assert_eq!(tool, "weather");
                assert_eq!(result_key, "forecast");
                assert_eq!(arguments.get("days"), Some(&json!(3)));
            }
            other => panic!("unexpected action {other:?}"),
        }
        match &protocol.steps[2].action {
            StepAction::Condition { mode, conditions, .. } => {
                assert_eq!(*mode, ConditionMode::Any);
                assert_eq!(conditions[0].operator, ConditionOperator::Exists);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
