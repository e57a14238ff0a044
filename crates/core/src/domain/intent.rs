use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Greeting,
    Farewell,
    Question,
    Command,
    #[default]
    Custom,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Farewell => "farewell",
            Self::Question => "question",
            Self::Command => "command",
            Self::Custom => "custom",
        }
    }
}

/// A named classification of user utterances.
///
/// Patterns are compared case-insensitively against the whole utterance and
/// as substrings of it. When several intents match, the higher `priority`
/// wins and registration order breaks ties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "type", default)]
    pub intent_type: IntentType,
    #[serde(default)]
    pub response_template: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl Intent {
    pub fn new<I, P>(name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
            priority: 0,
            intent_type: IntentType::Custom,
            response_template: None,
            protocol: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_type(mut self, intent_type: IntentType) -> Self {
        self.intent_type = intent_type;
        self
    }

    pub fn with_response(mut self, template: impl Into<String>) -> Self {
        self.response_template = Some(template.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Intent, IntentType};

    #[test]
    fn intent_deserializes_type_field_with_defaults() {
        let intent: Intent = toml::from_str(
            r#"
name = "greeting"
patterns = ["hello", "hi"]
type = "greeting"
"#,
        )
        .expect("intent should parse");

        assert_eq!(intent.intent_type, IntentType::Greeting);
        assert_eq!(intent.priority, 0);
        assert!(intent.protocol.is_none());
        assert_eq!(intent.patterns, vec!["hello".to_string(), "hi".to_string()]);
    }

    #[test]
    fn builder_sets_optional_fields() {
        let intent = Intent::new("weather", ["weather"])
            .with_priority(5)
            .with_type(IntentType::Question)
            .with_protocol("weather_lookup");

        assert_eq!(intent.priority, 5);
        assert_eq!(intent.intent_type.as_str(), "question");
        assert_eq!(intent.protocol.as_deref(), Some("weather_lookup"));
    }
}
