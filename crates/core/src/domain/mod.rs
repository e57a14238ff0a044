pub mod intent;
pub mod protocol;
pub mod session;

pub use intent::{Intent, IntentType};
pub use protocol::{
    Condition, ConditionMode, ConditionOperator, Protocol, ProtocolStep, StepAction, StepId,
    StepKind,
};
pub use session::{Session, SessionEvent, SessionEventKind, SessionId, SessionState};
