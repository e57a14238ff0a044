pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod intents;
pub mod store;
pub mod template;
pub mod tools;

pub use catalog::{Catalog, CatalogError};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::{
    Condition, ConditionMode, ConditionOperator, Intent, IntentType, Protocol, ProtocolStep,
    Session, SessionEventKind, SessionId, SessionState, StepAction, StepId,
};
pub use engine::{AdvanceOutcome, ConversationReply, EngineSettings, ProtocolEngine};
pub use errors::{ConfigurationError, EngineError, SessionStoreError};
pub use intents::{IntentRecognizer, Recognition};
pub use store::{InMemorySessionStore, SessionStore};
pub use tools::{
    register_builtin_tools, DuplicatePolicy, FunctionTool, Tool, ToolCall, ToolCallResult,
    ToolDefinition, ToolRegistry,
};
