pub mod chat;
pub mod check;
pub mod config;
pub mod tools;

use std::path::{Path, PathBuf};

use mova_core::catalog::{Catalog, CatalogError};
use mova_core::config::AppConfig;
use serde::Serialize;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_CATALOG_READ: u8 = 3;
pub const EXIT_CATALOG_INVALID: u8 = 4;
pub const EXIT_RUNTIME: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Picks the catalog named on the command line, else the configured one.
fn resolve_catalog_path(explicit: Option<&Path>, config: &AppConfig) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| config.catalog.path.clone())
}

fn load_catalog(command: &str, path: &Path) -> Result<Catalog, CommandResult> {
    Catalog::load(path).map_err(|error| match error {
        CatalogError::ReadFile { .. } => {
            CommandResult::failure(command, "catalog_read", error.to_string(), EXIT_CATALOG_READ)
        }
        CatalogError::Parse(_) | CatalogError::Invalid(_) => CommandResult::failure(
            command,
            "catalog_invalid",
            error.to_string(),
            EXIT_CATALOG_INVALID,
        ),
    })
}
