use std::collections::BTreeSet;
use std::path::Path;

use mova_core::config::{AppConfig, LoadOptions};
use mova_core::domain::StepAction;
use mova_core::engine::{EngineSettings, ProtocolEngine};
use mova_core::tools::register_builtin_tools;

use crate::commands::{
    load_catalog, resolve_catalog_path, CommandResult, EXIT_CATALOG_INVALID, EXIT_CATALOG_READ,
    EXIT_CONFIG,
};

pub fn run(catalog: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "check",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let Some(path) = resolve_catalog_path(catalog, &config) else {
        return CommandResult::failure(
            "check",
            "catalog_missing",
            "no catalog given; pass a path or set catalog.path",
            EXIT_CATALOG_READ,
        );
    };
    let catalog = match load_catalog("check", &path) {
        Ok(catalog) => catalog,
        Err(result) => return result,
    };

    let intents = catalog.intents.len();
    let protocols = catalog.protocols.len();
    let steps: usize = catalog.protocols.iter().map(|protocol| protocol.steps.len()).sum();
    let referenced_tools: BTreeSet<String> = catalog
        .protocols
        .iter()
        .flat_map(|protocol| protocol.steps.iter())
        .filter_map(|step| match &step.action {
            StepAction::ToolCall { tool, .. } => Some(tool.clone()),
            _ => None,
        })
        .collect();

    let mut engine = ProtocolEngine::new(EngineSettings::from(&config));
    if let Err(error) = register_builtin_tools(engine.tools_mut()) {
        return CommandResult::failure("check", "tool_registration", error.to_string(), EXIT_CONFIG);
    }
    if let Err(error) = engine.load_catalog(catalog) {
        return CommandResult::failure(
            "check",
            "catalog_invalid",
            error.to_string(),
            EXIT_CATALOG_INVALID,
        );
    }

    let external: Vec<&str> = referenced_tools
        .iter()
        .map(String::as_str)
        .filter(|tool| !engine.tools().contains(tool))
        .collect();

    let mut message = format!(
        "catalog `{}` is valid: {intents} intents, {protocols} protocols, {steps} steps",
        path.display()
    );
    if !external.is_empty() {
        message.push_str(&format!("; tools without a built-in handler: {}", external.join(", ")));
    }
    CommandResult::success("check", message)
}
