use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::errors::ConfigurationError;
use crate::tools::registry::{Tool, ToolDefinition, ToolRegistry};

type Handler = dyn Fn(&Map<String, Value>) -> Result<Value> + Send + Sync;

/// Adapts a synchronous closure into a [`Tool`].
pub struct FunctionTool {
    definition: ToolDefinition,
    handler: Box<Handler>,
}

impl FunctionTool {
    pub fn new<F>(definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self { definition, handler: Box::new(handler) }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value> {
        (self.handler)(arguments)
    }
}

pub struct EchoTool {
    definition: ToolDefinition,
}

impl Default for EchoTool {
    fn default() -> Self {
        Self {
            definition: ToolDefinition::new(
                "echo",
                "Echo",
                "Returns the given message unchanged",
                json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
            ),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("message must be a string"))?;
        Ok(Value::String(message.to_string()))
    }
}

pub struct CurrentTimeTool {
    definition: ToolDefinition,
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self {
            definition: ToolDefinition::new(
                "current_time",
                "Current time",
                "Returns the current UTC time as an RFC 3339 timestamp",
                json!({ "type": "object", "properties": {} }),
            ),
        }
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, _arguments: &Map<String, Value>) -> Result<Value> {
        Ok(json!({ "utc": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true) }))
    }
}

pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), ConfigurationError> {
    registry.register(EchoTool::default())?;
    registry.register(CurrentTimeTool::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use serde_json::{json, Map, Value};

    use super::{register_builtin_tools, FunctionTool};
    use crate::tools::registry::{ToolCall, ToolCallResult, ToolDefinition, ToolRegistry};

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall::new(name, arguments.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn builtins_are_registered_in_order() {
        let mut registry = ToolRegistry::default();
        register_builtin_tools(&mut registry).expect("builtins register");

        let names =
            registry.to_llm_specs(None).into_iter().map(|spec| spec.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["echo".to_string(), "current_time".to_string()]);

        let echoed = registry.execute(&call("echo", json!({ "message": "ping" }))).await;
        assert_eq!(echoed, ToolCallResult::Success(json!("ping")));

        let time = registry.execute(&call("current_time", json!({}))).await;
        assert!(time.to_value()["utc"].as_str().is_some_and(|utc| utc.ends_with('Z')));
    }

    #[tokio::test]
    async fn function_tool_runs_closure() {
        let mut registry = ToolRegistry::default();
        registry
            .register(FunctionTool::new(
                ToolDefinition::new(
                    "add",
                    "Add",
                    "Adds two integers",
                    json!({
                        "type": "object",
                        "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
                        "required": ["a", "b"]
                    }),
                ),
                |arguments: &Map<String, Value>| {
                    let a = arguments.get("a").and_then(Value::as_i64).unwrap_or_default();
                    let b = arguments.get("b").and_then(Value::as_i64).unwrap_or_default();
                    if a < 0 {
                        bail!("negative input");
                    }
                    Ok(json!(a + b))
                },
            ))
            .expect("register add");

        assert_eq!(registry.execute(&call("add", json!({ "a": 2, "b": 3 }))).await.to_value(), json!(5));
        assert_eq!(
            registry.execute(&call("add", json!({ "a": -1, "b": 3 }))).await.error_message(),
            Some("Error executing tool call: negative input")
        );
    }
}
