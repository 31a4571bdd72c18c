//! AG-UI wire protocol: event frames, wire messages, run input, and the
//! tool-result codec.
//!
//! These are the JSON shapes exchanged with a remote AG-UI agent endpoint.
//! See: <https://docs.ag-ui.com/concepts/events>

pub mod codec;
pub mod events;
pub mod mapper;
pub mod types;

pub use codec::{ResultCodec, TypeRegistry};
pub use events::{BaseEvent, Event};
pub use mapper::{
    core_message_from_wire, core_role_from_str, wire_message_from_core, wire_messages_from_core,
    MappingError,
};
pub use types::{ContextEntry, RunAgentInput, WireMessage, WireRole, WireTool, WireToolCall};
