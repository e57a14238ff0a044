use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::protocol::StepId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    AwaitingInput,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::AwaitingInput => "awaiting_input",
            Self::Terminated => "terminated",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Created,
    IntentRecognized,
    IntentUnmatched,
    ProtocolBound,
    PromptEmitted,
    InputReceived,
    ConditionEvaluated,
    ToolInvoked,
    Terminated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub step_id: Option<StepId>,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

/// Per-user execution context: protocol position, variables and history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub active: bool,
    pub state: SessionState,
    pub protocol: Option<String>,
    pub current_step: Option<StepId>,
    pub variables: BTreeMap<String, Value>,
    pub history: Vec<SessionEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut session = Self {
            id: SessionId::generate(),
            user_id: user_id.into(),
            active: true,
            state: SessionState::Idle,
            protocol: None,
            current_step: None,
            variables: BTreeMap::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        session.record(SessionEventKind::Created, None, "session created");
        session
    }

    pub fn record(
        &mut self,
        kind: SessionEventKind,
        step_id: Option<&StepId>,
        detail: impl Into<String>,
    ) {
        let now = Utc::now();
        self.history.push(SessionEvent {
            kind,
            step_id: step_id.cloned(),
            detail: detail.into(),
            occurred_at: now,
        });
        self.updated_at = now;
    }

    /// Resolves a dot-separated variable path such as `forecast.error`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let root = self.variables.get(segments.next()?)?;
        segments.try_fold(root, |value, segment| match value {
            Value::Object(fields) => fields.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        })
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
        self.updated_at = Utc::now();
    }

    pub(crate) fn attach(&mut self, protocol: &str, first_step: StepId) {
        self.protocol = Some(protocol.to_string());
        self.current_step = Some(first_step.clone());
        self.state = SessionState::Running;
        self.record(SessionEventKind::ProtocolBound, Some(&first_step), protocol);
    }

    pub(crate) fn terminate(&mut self, reason: &str) {
        let step = self.current_step.take();
        self.state = SessionState::Terminated;
        self.active = false;
        self.record(SessionEventKind::Terminated, step.as_ref(), reason);
    }
}
