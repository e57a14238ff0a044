use serde::Serialize;
use tracing::debug;

use crate::domain::Intent;
use crate::errors::ConfigurationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Contains,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntentMatch {
    pub intent: Intent,
    pub pattern: String,
    pub kind: MatchKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Recognition {
    Matched(IntentMatch),
    NoMatch,
}

impl Recognition {
    pub fn intent_name(&self) -> Option<&str> {
        match self {
            Self::Matched(found) => Some(found.intent.name.as_str()),
            Self::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

#[derive(Clone, Debug, Default)]
pub struct IntentRecognizer {
    intents: Vec<Intent>,
}

impl IntentRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, intent: Intent) -> Result<(), ConfigurationError> {
        if self.intents.iter().any(|existing| existing.name == intent.name) {
            return Err(ConfigurationError::DuplicateIntent(intent.name));
        }
        self.intents.push(intent);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Option<Intent> {
        let position = self.intents.iter().position(|intent| intent.name == name)?;
        Some(self.intents.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<&Intent> {
        self.intents.iter().find(|intent| intent.name == name)
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Picks the highest-priority intent with a matching pattern. Among equal
    /// priorities the earliest registration wins.
    pub fn recognize(&self, utterance: &str) -> Recognition {
        let normalized = normalize_text(utterance);
        if normalized.is_empty() {
            return Recognition::NoMatch;
        }

        let mut best: Option<(&Intent, &str, MatchKind)> = None;
        for intent in &self.intents {
            let Some((pattern, kind)) = match_patterns(intent, &normalized) else {
                continue;
            };
            let better = best.map_or(true, |(current, _, _)| intent.priority > current.priority);
            if better {
                best = Some((intent, pattern, kind));
            }
        }

        match best {
            Some((intent, pattern, kind)) => {
                debug!(
                    event_name = "intents.recognized",
                    intent = %intent.name,
                    pattern = %pattern,
                    kind = ?kind,
                    "utterance matched intent"
                );
                Recognition::Matched(IntentMatch {
                    intent: intent.clone(),
                    pattern: pattern.to_string(),
                    kind,
                })
            }
            None => Recognition::NoMatch,
        }
    }
}

fn match_patterns<'a>(intent: &'a Intent, normalized: &str) -> Option<(&'a str, MatchKind)> {
    let mut contained = None;
    for pattern in &intent.patterns {
        let candidate = normalize_text(pattern);
        if candidate.is_empty() {
            continue;
        }
        if candidate == normalized {
            return Some((pattern.as_str(), MatchKind::Exact));
        }
        if contained.is_none() && normalized.contains(&candidate) {
            contained = Some((pattern.as_str(), MatchKind::Contains));
        }
    }
    contained
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::{IntentRecognizer, MatchKind, Recognition};
    use crate::domain::{Intent, IntentType};
    use crate::errors::ConfigurationError;

    fn recognizer(intents: Vec<Intent>) -> IntentRecognizer {
        let mut recognizer = IntentRecognizer::new();
        for intent in intents {
            recognizer.register(intent).expect("register intent");
        }
        recognizer
    }

    #[test]
    fn greeting_scenario_matches_exactly() {
        let recognizer = recognizer(vec![Intent::new("greeting", ["hello", "hi"])
            .with_priority(1)
            .with_type(IntentType::Greeting)]);

        match recognizer.recognize("hello") {
            Recognition::Matched(found) => {
                assert_eq!(found.intent.name, "greeting");
                assert_eq!(found.kind, MatchKind::Exact);
                assert_eq!(found.pattern, "hello");
            }
            Recognition::NoMatch => panic!("expected greeting to match"),
        }
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let recognizer = recognizer(vec![Intent::new("weather", ["Weather Today"])]);

        let recognition = recognizer.recognize("  What is the   WEATHER today?");
        assert_eq!(recognition.intent_name(), Some("weather"));
        assert!(matches!(recognition, Recognition::Matched(ref found) if found.kind == MatchKind::Contains));
    }

    #[test]
    fn higher_priority_wins() {
        let recognizer = recognizer(vec![
            Intent::new("generic", ["help"]).with_priority(1),
            Intent::new("billing", ["help with billing"]).with_priority(5),
        ]);

        assert_eq!(recognizer.recognize("I need help with billing").intent_name(), Some("billing"));
    }

    #[test]
    fn ties_prefer_first_registered() {
        let recognizer = recognizer(vec![
            Intent::new("first", ["order"]).with_priority(2),
            Intent::new("second", ["order"]).with_priority(2),
        ]);

        for _ in 0..10 {
            assert_eq!(recognizer.recognize("order").intent_name(), Some("first"));
        }
    }

    #[test]
    fn no_match_is_explicit() {
        let recognizer = recognizer(vec![Intent::new("greeting", ["hello"])]);

        assert_eq!(recognizer.recognize("goodbye"), Recognition::NoMatch);
        assert_eq!(recognizer.recognize("   "), Recognition::NoMatch);
        assert!(!recognizer.recognize("").is_match());
    }

    #[test]
    fn duplicate_names_are_rejected_and_unregister_removes() {
        let mut recognizer = recognizer(vec![Intent::new("greeting", ["hello"])]);

        assert_eq!(
            recognizer.register(Intent::new("greeting", ["hey"])),
            Err(ConfigurationError::DuplicateIntent("greeting".to_string()))
        );
        assert!(recognizer.unregister("greeting").is_some());
        assert!(recognizer.is_empty());
        assert_eq!(recognizer.recognize("hello"), Recognition::NoMatch);
    }
}
