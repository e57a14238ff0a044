use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mova_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field<'a> {
    key: &'a str,
    value: String,
    env_keys: &'a [&'a str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        Field {
            key: "engine.max_steps_per_advance",
            value: config.engine.max_steps_per_advance.to_string(),
            env_keys: &["MOVA_ENGINE_MAX_STEPS"],
        },
        Field {
            key: "engine.fallback_response",
            value: config.engine.fallback_response.clone(),
            env_keys: &["MOVA_ENGINE_FALLBACK_RESPONSE"],
        },
        Field {
            key: "tools.on_duplicate",
            value: config.tools.on_duplicate.as_str().to_string(),
            env_keys: &["MOVA_TOOLS_ON_DUPLICATE"],
        },
        Field {
            key: "catalog.path",
            value: config
                .catalog
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["MOVA_CATALOG_PATH"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["MOVA_LOGGING_LEVEL", "MOVA_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: config.logging.format.as_str().to_string(),
            env_keys: &["MOVA_LOGGING_FORMAT", "MOVA_LOG_FORMAT"],
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("mova.toml"), PathBuf::from("config/mova.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let set_env = env_keys
        .iter()
        .find(|key| env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false));
    if let Some(env_key) = set_env {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source};

    #[test]
    fn file_keys_are_attributed_to_the_file() {
        let doc: Value = "[engine]\nmax_steps_per_advance = 8\n".parse().expect("valid toml");

        assert!(contains_path(&doc, "engine.max_steps_per_advance"));
        assert!(!contains_path(&doc, "engine.fallback_response"));
        assert_eq!(
            field_source("engine.max_steps_per_advance", &[], Some(&doc), None),
            "file (config file)"
        );
        assert_eq!(field_source("logging.level", &[], Some(&doc), None), "default");
    }
}
