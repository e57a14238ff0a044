use mova_core::tools::{register_builtin_tools, DuplicatePolicy, ToolRegistry};

use crate::commands::{CommandResult, EXIT_RUNTIME};

/// Prints the built-in tool specs in the shape handed to a language model.
pub fn run() -> CommandResult {
    let mut registry = ToolRegistry::new(DuplicatePolicy::Reject);
    if let Err(error) = register_builtin_tools(&mut registry) {
        return CommandResult::failure("tools", "tool_registration", error.to_string(), EXIT_RUNTIME);
    }

    match serde_json::to_string_pretty(&registry.to_llm_specs(None)) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("tools", "serialization", error.to_string(), EXIT_RUNTIME),
    }
}
