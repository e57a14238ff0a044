//! Tool registry and call router.
//!
//! Tools are registered under an id with a JSON-Schema-shaped argument
//! contract. Every call is validated before dispatch, and lookup, validation
//! and handler failures all come back as [`ToolCallResult::Error`] values
//! rather than `Err`. A panicking handler is reported the same way.

pub mod builtin;
pub mod registry;
pub mod schema;

pub use builtin::{register_builtin_tools, CurrentTimeTool, EchoTool, FunctionTool};
pub use registry::{
    DuplicatePolicy, Tool, ToolCall, ToolCallResult, ToolDefinition, ToolRegistry, ToolSpec,
};
pub use schema::SchemaViolation;
