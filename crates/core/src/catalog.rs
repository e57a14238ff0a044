use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::{Intent, Protocol};
use crate::errors::ConfigurationError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid catalog: {0}")]
    Invalid(#[from] ConfigurationError),
}

/// Intents and protocols declared together in one TOML document.
///
/// ```toml
/// [[intents]]
/// name = "weather"
/// patterns = ["weather", "forecast"]
/// protocol = "weather_lookup"
///
/// [[protocols]]
/// name = "weather_lookup"
///
/// [[protocols.steps]]
/// id = "ask_city"
/// action = "prompt"
/// text = "Which city?"
/// store_as = "city"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub protocols: Vec<Protocol>,
}

impl Catalog {
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog = toml::from_str::<Catalog>(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        let catalog = Self::from_toml_str(&raw)?;
        info!(
            event_name = "catalog.loaded",
            path = %path.display(),
            intents = catalog.intents.len(),
            protocols = catalog.protocols.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn protocol(&self, name: &str) -> Option<&Protocol> {
        self.protocols.iter().find(|protocol| protocol.name == name)
    }

    /// Checks every protocol's structure and every intent's protocol reference.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut protocol_names = HashSet::with_capacity(self.protocols.len());
        for protocol in &self.protocols {
            if !protocol_names.insert(protocol.name.as_str()) {
                return Err(ConfigurationError::DuplicateProtocol(protocol.name.clone()));
            }
            protocol.validate()?;
        }

        let mut intent_names = HashSet::with_capacity(self.intents.len());
        for intent in &self.intents {
            if !intent_names.insert(intent.name.as_str()) {
                return Err(ConfigurationError::DuplicateIntent(intent.name.clone()));
            }
            if let Some(protocol) = &intent.protocol {
                if !protocol_names.contains(protocol.as_str()) {
                    return Err(ConfigurationError::UnknownProtocol {
                        intent: intent.name.clone(),
                        protocol: protocol.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::TempDir;

    use super::{Catalog, CatalogError};
    use crate::domain::{ConditionOperator, StepAction, StepKind};
    use crate::errors::ConfigurationError;

    const WEATHER: &str = r#"
[[intents]]
name = "greeting"
type = "greeting"
patterns = ["hello", "hi"]
response_template = "Hello there!"

[[intents]]
name = "weather"
patterns = ["weather", "forecast"]
priority = 10
protocol = "weather_lookup"

[[protocols]]
name = "weather_lookup"
description = "Ask for a city and fetch its forecast"

[[protocols.steps]]
id = "ask_city"
action = "prompt"
text = "Which city?"
store_as = "city"

[[protocols.steps]]
id = "fetch"
action = "tool_call"
tool = "weather"
result_key = "forecast"
arguments = { city = "$city", days = 3 }

[[protocols.steps]]
id = "check"
action = "condition"
on_true = "failed"
conditions = [{ variable = "forecast.error", operator = "exists" }]

[[protocols.steps]]
id = "done"
action = "end"
message = "Forecast for {{ city }} is ready."

[[protocols.steps]]
id = "failed"
action = "end"
message = "Sorry, no forecast for {{ city }}."
"#;

    #[test]
    fn parses_intents_and_protocol_steps() {
        let catalog = Catalog::from_toml_str(WEATHER).expect("catalog should parse");

        assert_eq!(catalog.intents.len(), 2);
        assert_eq!(catalog.intents[1].priority, 10);
        assert_eq!(catalog.intents[1].protocol.as_deref(), Some("weather_lookup"));

        let protocol = catalog.protocol("weather_lookup").expect("protocol should exist");
        let kinds: Vec<StepKind> = protocol.steps.iter().map(|step| step.action.kind()).collect();
        assert_eq!(
            kinds,
            vec![StepKind::Prompt, StepKind::ToolCall, StepKind::Condition, StepKind::End, StepKind::End]
        );

        match &protocol.steps[1].action {
            StepAction::ToolCall { tool, arguments, result_key } => {
                assert_eq!(tool, "weather");
                assert_eq!(result_key, "forecast");
                assert_eq!(arguments.get("city"), Some(&json!("$city")));
                assert_eq!(arguments.get("days"), Some(&json!(3)));
            }
            other => panic!("expected tool call, got {other:?}"),
        }
        match &protocol.steps[2].action {
            StepAction::Condition { conditions, on_true, .. } => {
                assert_eq!(conditions[0].operator, ConditionOperator::Exists);
                assert_eq!(on_true.as_ref().map(|id| id.as_str()), Some("failed"));
            }
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn intent_referencing_unknown_protocol_is_rejected() {
        let raw = r#"
[[intents]]
name = "book"
patterns = ["book"]
protocol = "booking"
"#;
        let error = Catalog::from_toml_str(raw).expect_err("catalog should be rejected");

        assert!(matches!(
            error,
            CatalogError::Invalid(ConfigurationError::UnknownProtocol { ref protocol, .. })
                if protocol == "booking"
        ));
    }

    #[test]
    fn broken_protocol_fails_at_load() {
        let raw = r#"
[[protocols]]
name = "loop"

[[protocols.steps]]
id = "check"
action = "condition"
on_true = "nowhere"
conditions = []
"#;
        let error = Catalog::from_toml_str(raw).expect_err("catalog should be rejected");

        assert!(matches!(
            error,
            CatalogError::Invalid(ConfigurationError::UnknownStepReference { ref target, .. })
                if target == "nowhere"
        ));
    }

    #[test]
    fn unknown_action_is_a_parse_error() {
        let raw = r#"
[[protocols]]
name = "demo"

[[protocols.steps]]
id = "jump"
action = "teleport"
"#;
        assert!(matches!(Catalog::from_toml_str(raw), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn loads_from_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("catalog.toml");
        fs::write(&path, WEATHER).expect("write catalog");

        let catalog = Catalog::load(&path).expect("catalog should load");
        assert_eq!(catalog.protocols.len(), 1);

        let missing = Catalog::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(CatalogError::ReadFile { .. })));
    }
}
