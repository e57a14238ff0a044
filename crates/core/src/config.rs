use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::DuplicatePolicy;

pub const MAX_STEPS_UPPER_BOUND: usize = 10_000;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub tools: ToolsConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    pub max_steps_per_advance: usize,
    pub fallback_response: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolsConfig {
    pub on_duplicate: DuplicatePolicy,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub max_steps_per_advance: Option<usize>,
    pub fallback_response: Option<String>,
    pub on_duplicate_tool: Option<DuplicatePolicy>,
    pub catalog_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                max_steps_per_advance: crate::engine::DEFAULT_MAX_STEPS_PER_ADVANCE,
                fallback_response: crate::engine::DEFAULT_FALLBACK_RESPONSE.to_string(),
            },
            tools: ToolsConfig { on_duplicate: DuplicatePolicy::Overwrite },
            catalog: CatalogConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("mova.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(max_steps_per_advance) = engine.max_steps_per_advance {
                self.engine.max_steps_per_advance = max_steps_per_advance;
            }
            if let Some(fallback_response) = engine.fallback_response {
                self.engine.fallback_response = fallback_response;
            }
        }

        if let Some(tools) = patch.tools {
            if let Some(on_duplicate) = tools.on_duplicate {
                self.tools.on_duplicate = on_duplicate;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(path) = catalog.path {
                self.catalog.path = Some(path);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MOVA_ENGINE_MAX_STEPS") {
            self.engine.max_steps_per_advance = parse_usize("MOVA_ENGINE_MAX_STEPS", &value)?;
        }
        if let Some(value) = read_env("MOVA_ENGINE_FALLBACK_RESPONSE") {
            self.engine.fallback_response = value;
        }

        if let Some(value) = read_env("MOVA_TOOLS_ON_DUPLICATE") {
            self.tools.on_duplicate = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "MOVA_TOOLS_ON_DUPLICATE".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        if let Some(value) = read_env("MOVA_CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(value));
        }

        let log_level = read_env("MOVA_LOGGING_LEVEL").or_else(|| read_env("MOVA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("MOVA_LOGGING_FORMAT").or_else(|| read_env("MOVA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(max_steps_per_advance) = overrides.max_steps_per_advance {
            self.engine.max_steps_per_advance = max_steps_per_advance;
        }
        if let Some(fallback_response) = overrides.fallback_response {
            self.engine.fallback_response = fallback_response;
        }
        if let Some(on_duplicate) = overrides.on_duplicate_tool {
            self.tools.on_duplicate = on_duplicate;
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = Some(catalog_path);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;
        validate_catalog(&self.catalog)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mova.toml"), PathBuf::from("config/mova.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.max_steps_per_advance == 0 || engine.max_steps_per_advance > MAX_STEPS_UPPER_BOUND {
        return Err(ConfigError::Validation(format!(
            "engine.max_steps_per_advance must be in range 1..={MAX_STEPS_UPPER_BOUND}"
        )));
    }

    if engine.fallback_response.trim().is_empty() {
        return Err(ConfigError::Validation(
            "engine.fallback_response must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    let empty = catalog.path.as_ref().map(|path| path.as_os_str().is_empty()).unwrap_or(false);
    if empty {
        return Err(ConfigError::Validation(
            "catalog.path must not be empty when set".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    tools: Option<ToolsPatch>,
    catalog: Option<CatalogPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    max_steps_per_advance: Option<usize>,
    fallback_response: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    on_duplicate: Option<DuplicatePolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
