use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use mova_core::config::{AppConfig, LoadOptions};
use mova_core::domain::{Session, SessionId};
use mova_core::engine::{ConversationReply, EngineSettings, ProtocolEngine};
use mova_core::errors::EngineError;
use mova_core::tools::register_builtin_tools;
use tracing::warn;

use crate::commands::{
    load_catalog, resolve_catalog_path, CommandResult, EXIT_CATALOG_READ, EXIT_CATALOG_INVALID,
    EXIT_CONFIG, EXIT_RUNTIME,
};

const QUIT_COMMANDS: [&str; 3] = ["/quit", "/exit", "/q"];

pub fn run(catalog: Option<&Path>, user: &str) -> CommandResult {
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_with_io(catalog, user, stdin.lock(), stdout.lock())
}

/// Drives a conversation over line-oriented input. Each non-empty line is one
/// utterance; replies are written prefixed with `mova> `.
pub fn run_with_io<R, W>(catalog: Option<&Path>, user: &str, input: R, mut output: W) -> CommandResult
where
    R: BufRead,
    W: Write,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let Some(path) = resolve_catalog_path(catalog, &config) else {
        return CommandResult::failure(
            "chat",
            "catalog_missing",
            "no catalog given; pass a path or set catalog.path",
            EXIT_CATALOG_READ,
        );
    };
    let catalog = match load_catalog("chat", &path) {
        Ok(catalog) => catalog,
        Err(result) => return result,
    };

    let mut engine = ProtocolEngine::new(EngineSettings::from(&config));
    if let Err(error) = register_builtin_tools(engine.tools_mut()) {
        return CommandResult::failure("chat", "tool_registration", error.to_string(), EXIT_RUNTIME);
    }
    if let Err(error) = engine.load_catalog(catalog) {
        return CommandResult::failure(
            "chat",
            "catalog_invalid",
            error.to_string(),
            EXIT_CATALOG_INVALID,
        );
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    match runtime.block_on(converse(&engine, user, input, &mut output)) {
        Ok(turns) => CommandResult::success("chat", format!("conversation closed after {turns} turns")),
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), EXIT_RUNTIME),
    }
}

async fn converse<R, W>(engine: &ProtocolEngine, user: &str, input: R, output: &mut W) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut session = engine.create_session(user).await?;
    let mut turns = 0usize;

    for line in input.lines() {
        let line = line.context("failed to read input")?;
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&utterance) {
            break;
        }
        turns += 1;

        let reply = match engine.handle_utterance(&session.id, utterance).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "cli.chat.turn_failed",
                    session_id = %session.id,
                    error = %error,
                    "utterance could not be handled"
                );
                writeln!(output, "mova> {}", error.user_message())?;
                if matches!(error, EngineError::SessionInactive(_) | EngineError::SessionNotFound(_))
                {
                    session = replace_session(engine, &session.id, user).await?;
                }
                continue;
            }
        };

        if let Some(text) = reply.text() {
            writeln!(output, "mova> {text}")?;
        }
        if let ConversationReply::Protocol { outcome, .. } = &reply {
            if outcome.is_terminated() {
                session = replace_session(engine, &session.id, user).await?;
            }
        }
    }

    output.flush()?;
    Ok(turns)
}

/// Drops the finished session so a long chat keeps one stored session.
async fn replace_session(
    engine: &ProtocolEngine,
    finished: &SessionId,
    user: &str,
) -> Result<Session> {
    engine.delete_session(finished).await?;
    Ok(engine.create_session(user).await?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use mova_core::engine::ProtocolEngine;
    use mova_core::store::SessionStore;
    use mova_core::tools::register_builtin_tools;
    use mova_core::Catalog;

    use super::converse;

    const REPEAT: &str = r#"
[[intents]]
name = "echo"
patterns = ["repeat"]
protocol = "repeat_after_me"

[[protocols]]
name = "repeat_after_me"

[[protocols.steps]]
id = "ask"
action = "prompt"
text = "What should I repeat?"
store_as = "phrase"

[[protocols.steps]]
id = "say"
action = "tool_call"
tool = "echo"
result_key = "echoed"
arguments = { message = "$phrase" }

[[protocols.steps]]
id = "done"
action = "end"
message = "You said: {{ echoed }}"
"#;

    #[tokio::test]
    async fn finished_sessions_are_replaced_not_accumulated() {
        let mut engine = ProtocolEngine::default();
        register_builtin_tools(engine.tools_mut()).expect("register builtins");
        engine
            .load_catalog(Catalog::from_toml_str(REPEAT).expect("parse catalog"))
            .expect("load catalog");

        let input = Cursor::new("repeat\none\nrepeat\ntwo\nrepeat\nthree\n");
        let mut output = Vec::new();
        let turns = converse(&engine, "ana", input, &mut output).await.expect("conversation");

        assert_eq!(turns, 6);
        assert_eq!(engine.store().len().await.expect("count sessions"), 1);
        let transcript = String::from_utf8(output).expect("utf-8 transcript");
        assert!(transcript.ends_with("mova> You said: three\n"), "{transcript}");
    }
}
