use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::domain::{
    Intent, Protocol, ProtocolStep, Session, SessionEventKind, SessionId, SessionState, StepAction,
};
use crate::engine::conditions::evaluate_all;
use crate::engine::locks::SessionLocks;
use crate::engine::outcome::{AdvanceOutcome, ConversationReply, StepToolResult};
use crate::errors::{ConfigurationError, EngineError};
use crate::intents::{IntentRecognizer, Recognition};
use crate::store::{InMemorySessionStore, SessionStore};
use crate::template::render_or_raw;
use crate::tools::{DuplicatePolicy, Tool, ToolCall, ToolRegistry};

pub const DEFAULT_MAX_STEPS_PER_ADVANCE: usize = 256;
pub const DEFAULT_FALLBACK_RESPONSE: &str = "Sorry, I didn't understand that.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_steps_per_advance: usize,
    pub fallback_response: String,
    pub duplicate_tools: DuplicatePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps_per_advance: DEFAULT_MAX_STEPS_PER_ADVANCE,
            fallback_response: DEFAULT_FALLBACK_RESPONSE.to_string(),
            duplicate_tools: DuplicatePolicy::Overwrite,
        }
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_steps_per_advance: config.engine.max_steps_per_advance,
            fallback_response: config.engine.fallback_response.clone(),
            duplicate_tools: config.tools.on_duplicate,
        }
    }
}

/// Owns the intent, protocol and tool registries and the session store.
///
/// Registration takes `&mut self`, so it happens before the engine is shared.
/// Session operations take `&self` and serialize per session id.
pub struct ProtocolEngine<S = InMemorySessionStore> {
    settings: EngineSettings,
    recognizer: IntentRecognizer,
    protocols: HashMap<String, Arc<Protocol>>,
    tools: ToolRegistry,
    store: S,
    locks: SessionLocks,
}

impl ProtocolEngine<InMemorySessionStore> {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_store(settings, InMemorySessionStore::default())
    }
}

impl Default for ProtocolEngine<InMemorySessionStore> {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl<S> ProtocolEngine<S>
where
    S: SessionStore,
{
    pub fn with_store(settings: EngineSettings, store: S) -> Self {
        let tools = ToolRegistry::new(settings.duplicate_tools);
        Self {
            settings,
            recognizer: IntentRecognizer::new(),
            protocols: HashMap::new(),
            tools,
            store,
            locks: SessionLocks::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn recognizer(&self) -> &IntentRecognizer {
        &self.recognizer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn protocol(&self, name: &str) -> Option<&Protocol> {
        self.protocols.get(name).map(Arc::as_ref)
    }

    pub fn register_intent(&mut self, intent: Intent) -> Result<(), ConfigurationError> {
        self.recognizer.register(intent)
    }

    pub fn unregister_intent(&mut self, name: &str) -> Option<Intent> {
        self.recognizer.unregister(name)
    }

    /// Stores a protocol definition. Its structure is checked when a session
    /// binds it (and by [`Catalog`] loading), so a broken definition fails
    /// before any step runs.
    pub fn register_protocol(&mut self, protocol: Protocol) -> Result<(), ConfigurationError> {
        if self.protocols.contains_key(&protocol.name) {
            return Err(ConfigurationError::DuplicateProtocol(protocol.name));
        }
        self.protocols.insert(protocol.name.clone(), Arc::new(protocol));
        Ok(())
    }

    pub fn unregister_protocol(&mut self, name: &str) -> bool {
        self.protocols.remove(name).is_some()
    }

    pub fn register_tool<T>(&mut self, tool: T) -> Result<(), ConfigurationError>
    where
        T: Tool + 'static,
    {
        self.tools.register(tool)
    }

    pub fn unregister_tool(&mut self, id: &str) -> bool {
        self.tools.unregister(id)
    }

    /// Registers every intent and protocol of `catalog`, or none of them.
    pub fn load_catalog(&mut self, catalog: Catalog) -> Result<(), ConfigurationError> {
        catalog.validate()?;
        if let Some(protocol) =
            catalog.protocols.iter().find(|protocol| self.protocols.contains_key(&protocol.name))
        {
            return Err(ConfigurationError::DuplicateProtocol(protocol.name.clone()));
        }
        if let Some(intent) =
            catalog.intents.iter().find(|intent| self.recognizer.get(&intent.name).is_some())
        {
            return Err(ConfigurationError::DuplicateIntent(intent.name.clone()));
        }

        for protocol in catalog.protocols {
            self.register_protocol(protocol)?;
        }
        for intent in catalog.intents {
            self.register_intent(intent)?;
        }
        Ok(())
    }

    pub async fn create_session(&self, user_id: &str) -> Result<Session, EngineError> {
        let session = Session::new(user_id);
        self.store.put(session.clone()).await?;
        info!(
            event_name = "engine.session.created",
            session_id = %session.id,
            user_id = %session.user_id,
            "session created"
        );
        Ok(session)
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, EngineError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<bool, EngineError> {
        let _guard = self.locks.acquire(id).await;
        Ok(self.store.delete(id).await?)
    }

    pub async fn bind_protocol(
        &self,
        id: &SessionId,
        protocol_name: &str,
    ) -> Result<Session, EngineError> {
        let _guard = self.locks.acquire(id).await;
        let mut session = self.load_active(id).await?;
        self.attach_protocol(&mut session, protocol_name)?;
        self.store.put(session.clone()).await?;
        Ok(session)
    }

    /// Abandons the session: it becomes inactive and rejects further steps.
    pub async fn end_session(&self, id: &SessionId) -> Result<Session, EngineError> {
        let _guard = self.locks.acquire(id).await;
        let mut session = self.load_active(id).await?;
        session.terminate("session ended by caller");
        self.store.put(session.clone()).await?;
        info!(event_name = "engine.session.terminated", session_id = %id, reason = "abandoned", "session ended");
        Ok(session)
    }

    pub async fn recognize_intent(
        &self,
        id: &SessionId,
        utterance: &str,
    ) -> Result<Recognition, EngineError> {
        let _guard = self.locks.acquire(id).await;
        let mut session = self.load_active(id).await?;
        let recognition = self.recognize_for(&mut session, utterance);
        self.store.put(session).await?;
        Ok(recognition)
    }

    /// Runs the bound protocol until it prompts, ends, or hits the step limit.
    ///
    /// `input` answers a pending prompt; it is ignored when nothing is pending.
    pub async fn advance_protocol(
        &self,
        id: &SessionId,
        input: Option<&str>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let _guard = self.locks.acquire(id).await;
        let mut session = self.load_active(id).await?;
        let result = self.walk(&mut session, input).await;
        self.store.put(session).await?;
        result
    }

    /// Conversational entry point: resumes a pending protocol, or recognizes
    /// the utterance and reacts to the matched intent.
    pub async fn handle_utterance(
        &self,
        id: &SessionId,
        utterance: &str,
    ) -> Result<ConversationReply, EngineError> {
        let _guard = self.locks.acquire(id).await;
        let mut session = self.load_active(id).await?;
        let result = self.converse(&mut session, utterance).await;
        self.store.put(session).await?;
        result
    }

    async fn converse(
        &self,
        session: &mut Session,
        utterance: &str,
    ) -> Result<ConversationReply, EngineError> {
        if matches!(session.state, SessionState::AwaitingInput | SessionState::Running) {
            let outcome = self.walk(session, Some(utterance)).await?;
            return Ok(ConversationReply::Protocol { intent: None, outcome });
        }

        let found = match self.recognize_for(session, utterance) {
            Recognition::Matched(found) => found,
            Recognition::NoMatch => {
                return Ok(ConversationReply::Fallback {
                    message: self.settings.fallback_response.clone(),
                });
            }
        };

        let intent = found.intent;
        if let Some(protocol) = &intent.protocol {
            self.attach_protocol(session, protocol)?;
            let outcome = self.walk(session, None).await?;
            return Ok(ConversationReply::Protocol { intent: Some(intent.name), outcome });
        }

        let message =
            intent.response_template.as_deref().map(|template| render_or_raw(template, session));
        Ok(ConversationReply::Response { intent: intent.name, message })
    }

    fn recognize_for(&self, session: &mut Session, utterance: &str) -> Recognition {
        let recognition = self.recognizer.recognize(utterance);
        match &recognition {
            Recognition::Matched(found) => {
                session.record(SessionEventKind::IntentRecognized, None, found.intent.name.as_str())
            }
            Recognition::NoMatch => {
                session.record(SessionEventKind::IntentUnmatched, None, utterance)
            }
        }
        recognition
    }

    async fn load_active(&self, id: &SessionId) -> Result<Session, EngineError> {
        let session =
            self.store.get(id).await?.ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        if !session.active || session.state == SessionState::Terminated {
            return Err(EngineError::SessionInactive(id.clone()));
        }
        Ok(session)
    }

    fn attach_protocol(&self, session: &mut Session, name: &str) -> Result<(), EngineError> {
        let protocol =
            self.protocols.get(name).ok_or_else(|| EngineError::ProtocolNotFound(name.to_string()))?;
        protocol.validate()?;
        let first = protocol
            .first_step()
            .map(|step| step.id.clone())
            .ok_or_else(|| ConfigurationError::EmptyProtocol { protocol: name.to_string() })?;

        session.attach(name, first);
        info!(
            event_name = "engine.protocol.bound",
            session_id = %session.id,
            protocol = %name,
            "protocol bound to session"
        );
        Ok(())
    }

    async fn walk(
        &self,
        session: &mut Session,
        input: Option<&str>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let protocol = match (&session.protocol, session.state) {
            (_, SessionState::Idle) | (None, _) => {
                return Err(EngineError::NoProtocolBound(session.id.clone()));
            }
            (_, SessionState::Terminated) => {
                return Err(EngineError::SessionInactive(session.id.clone()));
            }
            (Some(name), _) => self
                .protocols
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::ProtocolNotFound(name.clone()))?,
        };
        let mut outcome = AdvanceOutcome::new(session.id.clone(), session.state);

        if session.state == SessionState::AwaitingInput {
            let (index, step) = current_step(&protocol, session)?;
            let StepAction::Prompt { text, store_as } = &step.action else {
                return Err(unknown_step(&protocol, session));
            };

            let Some(input) = input else {
                outcome.prompt = Some(render_or_raw(text, session));
                outcome.current_step = Some(step.id.clone());
                return Ok(outcome);
            };

            if let Some(variable) = store_as {
                session.set_variable(variable.clone(), Value::String(input.to_string()));
            }
            session.record(SessionEventKind::InputReceived, Some(&step.id), input);
            session.current_step = protocol.next_after(index).cloned();
            session.state = SessionState::Running;
        } else if input.is_some() {
            debug!(
                event_name = "engine.input.ignored",
                session_id = %session.id,
                "input received while no prompt was pending"
            );
        }

        let mut executed = 0usize;
        loop {
            let Some(step_id) = session.current_step.clone() else {
                session.terminate("protocol finished without an end step");
                info!(event_name = "engine.session.terminated", session_id = %session.id, reason = "exhausted", "protocol finished");
                break;
            };
            if executed >= self.settings.max_steps_per_advance {
                warn!(
                    event_name = "engine.step_limit.exceeded",
                    session_id = %session.id,
                    step_id = %step_id,
                    limit = self.settings.max_steps_per_advance,
                    "step limit reached; session left resumable"
                );
                return Err(EngineError::StepLimitExceeded {
                    session_id: session.id.clone(),
                    limit: self.settings.max_steps_per_advance,
                });
            }
            let (index, step) = current_step(&protocol, session)?;
            executed += 1;
            outcome.executed_steps.push(step_id.clone());
            debug!(
                event_name = "engine.step.executed",
                session_id = %session.id,
                step_id = %step_id,
                kind = step.action.kind().as_str(),
                "executing step"
            );

            match &step.action {
                StepAction::Prompt { text, .. } => {
                    let prompt = render_or_raw(text, session);
                    session.state = SessionState::AwaitingInput;
                    session.record(SessionEventKind::PromptEmitted, Some(&step_id), prompt.as_str());
                    outcome.prompt = Some(prompt);
                    break;
                }
                StepAction::Condition { conditions, mode, on_true, on_false } => {
                    let passed = evaluate_all(conditions, *mode, session);
                    let branch = if passed { on_true } else { on_false };
                    session.current_step =
                        branch.clone().or_else(|| protocol.next_after(index).cloned());
                    session.record(
                        SessionEventKind::ConditionEvaluated,
                        Some(&step_id),
                        if passed { "true" } else { "false" },
                    );
                }
                StepAction::ToolCall { tool, arguments, result_key } => {
                    let call = ToolCall {
                        id: Some(step_id.0.clone()),
                        name: tool.clone(),
                        arguments: resolve_arguments(arguments, session),
                    };
                    let result = self.tools.execute(&call).await;
                    session.set_variable(result_key.clone(), result.to_value());
                    session.record(
                        SessionEventKind::ToolInvoked,
                        Some(&step_id),
                        result.error_message().unwrap_or(tool.as_str()),
                    );
                    outcome.tool_results.push(StepToolResult {
                        step_id: step_id.clone(),
                        tool: tool.clone(),
                        result,
                    });
                    session.current_step = protocol.next_after(index).cloned();
                }
                StepAction::End { message } => {
                    outcome.end_message =
                        message.as_deref().map(|message| render_or_raw(message, session));
                    session.terminate("end step reached");
                    info!(event_name = "engine.session.terminated", session_id = %session.id, reason = "end_step", "protocol ended");
                    break;
                }
            }
        }

        outcome.state = session.state;
        outcome.current_step = session.current_step.clone();
        Ok(outcome)
    }
}

fn current_step<'p>(
    protocol: &'p Protocol,
    session: &Session,
) -> Result<(usize, &'p ProtocolStep), EngineError> {
    session
        .current_step
        .as_ref()
        .and_then(|id| protocol.step(id))
        .ok_or_else(|| unknown_step(protocol, session))
}

fn unknown_step(protocol: &Protocol, session: &Session) -> EngineError {
    let target = session.current_step.as_ref().map(|id| id.0.clone()).unwrap_or_default();
    EngineError::Configuration(ConfigurationError::UnknownStepReference {
        protocol: protocol.name.clone(),
        step: target.clone(),
        target,
    })
}

/// Replaces `"$path"` string arguments with the bound session variable.
/// Unbound references are dropped so schema validation reports them;
/// `"$$text"` escapes a literal `"$text"`.
fn resolve_arguments(arguments: &Map<String, Value>, session: &Session) -> Map<String, Value> {
    let mut resolved = Map::with_capacity(arguments.len());
    for (name, value) in arguments {
        let Value::String(text) = value else {
            resolved.insert(name.clone(), value.clone());
            continue;
        };
        if let Some(literal) = text.strip_prefix("$$") {
            resolved.insert(name.clone(), Value::String(format!("${literal}")));
        } else if let Some(path) = text.strip_prefix('$').filter(|path| !path.is_empty()) {
            if let Some(bound) = session.lookup(path) {
                resolved.insert(name.clone(), bound.clone());
            }
        } else {
            resolved.insert(name.clone(), value.clone());
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{resolve_arguments, ProtocolEngine};
    use crate::domain::{Protocol, ProtocolStep, Session};
    use crate::store::SessionStore;

    #[test]
    fn arguments_resolve_variable_references() {
        let mut session = Session::new("ana");
        session.set_variable("city", json!("Lisbon"));
        session.set_variable("profile", json!({ "days": 3 }));

        let mut arguments = Map::new();
        arguments.insert("city".to_string(), json!("$city"));
        arguments.insert("days".to_string(), json!("$profile.days"));
        arguments.insert("missing".to_string(), json!("$nope"));
        arguments.insert("price".to_string(), json!("$$5"));
        arguments.insert("units".to_string(), json!("metric"));
        arguments.insert("count".to_string(), json!(2));

        let resolved = resolve_arguments(&arguments, &session);

        assert_eq!(resolved.get("city"), Some(&json!("Lisbon")));
        assert_eq!(resolved.get("days"), Some(&json!(3)));
        assert!(!resolved.contains_key("missing"));
        assert_eq!(resolved.get("price"), Some(&json!("$5")));
        assert_eq!(resolved.get("units"), Some(&json!("metric")));
        assert_eq!(resolved.get("count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn finished_sessions_leave_no_locks_behind() {
        let mut engine = ProtocolEngine::default();
        engine
            .register_protocol(Protocol::new(
                "ask_once",
                vec![ProtocolStep::prompt("ask", "Ready?", None), ProtocolStep::end("done", None)],
            ))
            .expect("register protocol");

        for index in 0..1000 {
            let session = engine.create_session("ana").await.expect("create session");
            engine.bind_protocol(&session.id, "ask_once").await.expect("bind protocol");
            engine.advance_protocol(&session.id, None).await.expect("prompt");
            let outcome =
                engine.advance_protocol(&session.id, Some("yes")).await.expect("finish");
            assert!(outcome.is_terminated());
            if index % 2 == 0 {
                engine.delete_session(&session.id).await.expect("delete session");
            }
        }

        assert_eq!(engine.locks.len(), 0);
        assert_eq!(engine.store.len().await.expect("count sessions"), 500);
    }
}
