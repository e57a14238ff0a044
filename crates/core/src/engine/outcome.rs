use serde::Serialize;

use crate::domain::{SessionId, SessionState, StepId};
use crate::tools::ToolCallResult;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepToolResult {
    pub step_id: StepId,
    pub tool: String,
    pub result: ToolCallResult,
}

/// What a single `advance_protocol` call did and where the session stopped.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AdvanceOutcome {
    pub session_id: SessionId,
    pub state: SessionState,
    pub current_step: Option<StepId>,
    pub executed_steps: Vec<StepId>,
    pub prompt: Option<String>,
    pub end_message: Option<String>,
    pub tool_results: Vec<StepToolResult>,
}

impl AdvanceOutcome {
    pub(crate) fn new(session_id: SessionId, state: SessionState) -> Self {
        Self {
            session_id,
            state,
            current_step: None,
            executed_steps: Vec::new(),
            prompt: None,
            end_message: None,
            tool_results: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    pub fn is_awaiting_input(&self) -> bool {
        self.state == SessionState::AwaitingInput
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationReply {
    /// The utterance started or continued a protocol.
    Protocol { intent: Option<String>, outcome: AdvanceOutcome },
    /// A matched intent without a protocol answered directly.
    Response { intent: String, message: Option<String> },
    Fallback { message: String },
}

impl ConversationReply {
    /// Text to show the user, if this reply carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Protocol { outcome, .. } => {
                outcome.prompt.as_deref().or(outcome.end_message.as_deref())
            }
            Self::Response { message, .. } => message.as_deref(),
            Self::Fallback { message } => Some(message),
        }
    }
}
