//! Protocol execution: session lifecycle, step walking and the
//! conversational entry point.

pub mod conditions;
mod locks;
pub mod outcome;
pub mod runtime;

pub use outcome::{AdvanceOutcome, ConversationReply, StepToolResult};
pub use runtime::{
    EngineSettings, ProtocolEngine, DEFAULT_FALLBACK_RESPONSE, DEFAULT_MAX_STEPS_PER_ADVANCE,
};
