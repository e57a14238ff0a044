use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::ConfigurationError;
use crate::tools::schema::{ensure_object_schema, validate_arguments};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Registry key and the name callers use to invoke the tool.
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self { id: id.into(), name: name.into(), description: description.into(), parameters }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value>;
}

/// What callers outside the engine (for example an LLM) see of a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self { id: None, name: name.into(), arguments }
    }
}

/// Outcome of one tool call. Serializes to the handler's value on success
/// and to `{"error": "<message>"}` on failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolCallResult {
    Error { error: String },
    Success(Value),
}

impl ToolCallResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { error: message.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Error { error } => {
                let mut fields = Map::new();
                fields.insert("error".to_string(), Value::String(error.clone()));
                Value::Object(fields)
            }
            Self::Success(value) => value.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Last registration wins; the tool keeps its original position.
    #[default]
    Overwrite,
    Reject,
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unsupported duplicate policy `{other}` (expected overwrite|reject)")),
        }
    }
}

/// Named tools in registration order, plus the call router over them.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    duplicate_policy: DuplicatePolicy,
}

impl ToolRegistry {
    pub fn new(duplicate_policy: DuplicatePolicy) -> Self {
        Self { tools: Vec::new(), index: HashMap::new(), duplicate_policy }
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    pub fn register<T>(&mut self, tool: T) -> Result<(), ConfigurationError>
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool))
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<(), ConfigurationError> {
        let definition = tool.definition();
        let id = definition.id.clone();
        ensure_object_schema(&definition.parameters)
            .map_err(|reason| ConfigurationError::InvalidToolSchema { tool: id.clone(), reason })?;

        match (self.index.get(&id).copied(), self.duplicate_policy) {
            (Some(_), DuplicatePolicy::Reject) => Err(ConfigurationError::DuplicateTool(id)),
            (Some(position), DuplicatePolicy::Overwrite) => {
                warn!(event_name = "tools.registry.overwritten", tool = %id, "tool registration replaced");
                self.tools[position] = tool;
                Ok(())
            }
            (None, _) => {
                debug!(event_name = "tools.registry.registered", tool = %id, "tool registered");
                self.index.insert(id, self.tools.len());
                self.tools.push(tool);
                Ok(())
            }
        }
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        let Some(position) = self.index.remove(id) else {
            return false;
        };
        self.tools.remove(position);
        self.index = self
            .tools
            .iter()
            .enumerate()
            .map(|(position, tool)| (tool.definition().id.clone(), position))
            .collect();
        true
    }

    /// Looks a tool up by id, then by its human-readable name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        let position = self.index.get(name).copied().or_else(|| {
            self.tools.iter().position(|tool| tool.definition().name == name)
        })?;
        self.tools.get(position).map(|tool| tool.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition())
    }

    /// Specs in registration order, optionally restricted to `allowed` ids.
    pub fn to_llm_specs(&self, allowed: Option<&[&str]>) -> Vec<ToolSpec> {
        self.definitions()
            .filter(|definition| {
                allowed.map_or(true, |allowed| allowed.contains(&definition.id.as_str()))
            })
            .map(|definition| ToolSpec {
                name: definition.id.clone(),
                description: definition.description.clone(),
                parameters: definition.parameters.clone(),
            })
            .collect()
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolCallResult {
        let Some(tool) = self.get(&call.name) else {
            debug!(event_name = "tools.call.not_found", tool = %call.name, "tool lookup failed");
            return ToolCallResult::error(format!("Tool not found: {}", call.name));
        };

        if let Err(violation) = validate_arguments(&tool.definition().parameters, &call.arguments)
        {
            debug!(
                event_name = "tools.call.invalid_arguments",
                tool = %call.name,
                violation = %violation,
                "tool arguments rejected"
            );
            return ToolCallResult::error(format!("Invalid arguments for tool {}", call.name));
        }

        match AssertUnwindSafe(tool.execute(&call.arguments)).catch_unwind().await {
            Ok(Ok(value)) => {
                debug!(event_name = "tools.call.completed", tool = %call.name, "tool call completed");
                ToolCallResult::Success(value)
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "tools.call.failed",
                    tool = %call.name,
                    error = %error,
                    "tool handler returned an error"
                );
                ToolCallResult::error(format!("Error executing tool call: {error}"))
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                warn!(
                    event_name = "tools.call.panicked",
                    tool = %call.name,
                    reason = %reason,
                    "tool handler panicked"
                );
                ToolCallResult::error(format!("Error executing tool call: handler panicked: {reason}"))
            }
        }
    }

    /// Executes every call independently; one result per call, in order.
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
