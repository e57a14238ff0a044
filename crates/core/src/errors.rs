use thiserror::Error;

use crate::domain::SessionId;

/// Rejected registrations and protocol definitions. Always reported at
/// load or bind time, never while a protocol is being walked.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("protocol `{protocol}` has no steps")]
    EmptyProtocol { protocol: String },
    #[error("protocol `{protocol}` declares step `{step}` more than once")]
    DuplicateStep { protocol: String, step: String },
    #[error("step `{step}` in protocol `{protocol}` references unknown step `{target}`")]
    UnknownStepReference { protocol: String, step: String, target: String },
    #[error("protocol `{protocol}` has no path that reaches an end step")]
    NoReachableEnd { protocol: String },
    #[error("invalid template at `{location}`: {message}")]
    InvalidTemplate { location: String, message: String },
    #[error("protocol `{0}` is already registered")]
    DuplicateProtocol(String),
    #[error("intent `{0}` is already registered")]
    DuplicateIntent(String),
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    #[error("tool `{tool}` has an invalid argument schema: {reason}")]
    InvalidToolSchema { tool: String, reason: String },
    #[error("intent `{intent}` is bound to unknown protocol `{protocol}`")]
    UnknownProtocol { intent: String, protocol: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store backend failure: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("session inactive: {0}")]
    SessionInactive(SessionId),
    #[error("session {0} has no protocol bound")]
    NoProtocolBound(SessionId),
    #[error("protocol not found: {0}")]
    ProtocolNotFound(String),
    #[error("session {session_id} exceeded {limit} steps in a single advance")]
    StepLimitExceeded { session_id: SessionId, limit: usize },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

impl EngineError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "That conversation could not be found. Start a new one.",
            Self::SessionInactive(_) => "This conversation has ended. Start a new one to continue.",
            Self::NoProtocolBound(_) => "There is nothing in progress for this conversation.",
            Self::ProtocolNotFound(_) | Self::Configuration(_) => {
                "The requested workflow is not configured correctly."
            }
            Self::StepLimitExceeded { .. } => {
                "The workflow took too many steps. Send another message to continue."
            }
            Self::Store(_) => "Conversation state is temporarily unavailable. Please retry shortly.",
        }
    }

    /// Lookup failures a caller can recover from by starting over.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::ProtocolNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::SessionId;
    use crate::errors::{ConfigurationError, EngineError, SessionStoreError};

    #[test]
    fn configuration_error_converts_into_engine_error() {
        let error = EngineError::from(ConfigurationError::UnknownStepReference {
            protocol: "weather".to_owned(),
            step: "check".to_owned(),
            target: "nowhere".to_owned(),
        });

        assert!(matches!(error, EngineError::Configuration(_)));
        assert_eq!(
            error.to_string(),
            "step `check` in protocol `weather` references unknown step `nowhere`"
        );
        assert_eq!(error.user_message(), "The requested workflow is not configured correctly.");
    }

    #[test]
    fn inactive_session_has_user_safe_message() {
        let error = EngineError::SessionInactive(SessionId::from("s-1"));

        assert_eq!(error.to_string(), "session inactive: s-1");
        assert_eq!(
            error.user_message(),
            "This conversation has ended. Start a new one to continue."
        );
        assert!(!error.is_lookup_failure());
    }

    #[test]
    fn store_error_maps_to_retry_message() {
        let error = EngineError::from(SessionStoreError::Backend("lock timeout".to_owned()));

        assert_eq!(
            error.user_message(),
            "Conversation state is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn missing_session_is_a_lookup_failure() {
        assert!(EngineError::SessionNotFound(SessionId::from("s-404")).is_lookup_failure());
    }
}
