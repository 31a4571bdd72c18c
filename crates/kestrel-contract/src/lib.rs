//! Unified chat/agent contracts shared across the kestrel workspace.
//!
//! This crate is protocol-neutral: it defines the message model, the tool
//! contracts, and the response-update shapes that the AG-UI client bridge
//! produces. Nothing in here knows about wire encodings.

pub mod registry;
pub mod tool;
pub mod types;
pub mod update;

pub use registry::ToolRegistry;
pub use tool::{
    validate_against_schema, Tool, ToolDescriptor, ToolError, ToolResult, ToolStatus, TypedTool,
};
pub use types::{gen_message_id, Message, Role, ToolCall};
pub use update::{AgentRunResponse, AgentUpdate, UpdateContent};
