//! Bidirectional conversion between the unified message model and AG-UI
//! wire messages.
//!
//! Roles map 1:1 in both directions. Unknown wire roles are an explicit
//! mapping error — never a silent default.

use crate::types::{WireMessage, WireRole, WireToolCall};
use kestrel_contract::{Message, Role, ToolCall};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while mapping between unified and wire representations.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("unrecognized wire role `{0}`")]
    UnknownRole(String),

    #[error("tool message is missing its call id")]
    MissingCallId,

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("structured tool result requires a type registry, but none is configured")]
    MissingTypeRegistry,

    #[error("tool result type `{0}` is not registered with the codec")]
    UnregisteredType(String),

    #[error("tool result payload does not match registered type `{type_name}`: {reason}")]
    InvalidPayload { type_name: String, reason: String },
}

impl From<Role> for WireRole {
    fn from(role: Role) -> Self {
        match role {
            Role::System => WireRole::System,
            Role::User => WireRole::User,
            Role::Assistant => WireRole::Assistant,
            Role::Developer => WireRole::Developer,
            Role::Tool => WireRole::Tool,
        }
    }
}

impl From<WireRole> for Role {
    fn from(role: WireRole) -> Self {
        match role {
            WireRole::System => Role::System,
            WireRole::User => Role::User,
            WireRole::Assistant => Role::Assistant,
            WireRole::Developer => Role::Developer,
            WireRole::Tool => Role::Tool,
        }
    }
}

/// Parse a dynamic role string into a unified [`Role`].
///
/// Used when role strings arrive outside the typed wire model (e.g. raw
/// frames). Unrecognized strings fail with [`MappingError::UnknownRole`].
pub fn core_role_from_str(role: &str) -> Result<Role, MappingError> {
    match role {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "developer" => Ok(Role::Developer),
        "tool" => Ok(Role::Tool),
        other => Err(MappingError::UnknownRole(other.to_string())),
    }
}

/// Convert a unified message to its wire form.
///
/// Tool-role messages must carry a call id; their content is the
/// JSON-encoded result payload produced by the result codec. Assistant
/// tool calls are carried as wire tool-call entries with string-encoded
/// arguments.
pub fn wire_message_from_core(msg: &Message) -> Result<WireMessage, MappingError> {
    let mut wire = WireMessage {
        role: msg.role.into(),
        content: msg.content.clone(),
        id: msg.id.clone(),
        tool_call_id: None,
        tool_calls: None,
    };

    match msg.role {
        Role::Tool => {
            let call_id = msg.tool_call_id.as_ref().ok_or(MappingError::MissingCallId)?;
            wire.tool_call_id = Some(call_id.clone());
        }
        Role::Assistant if msg.has_tool_calls() => {
            let calls = msg
                .tool_calls()
                .iter()
                .map(|call| {
                    let arguments = serde_json::to_string(&call.arguments)
                        .map_err(|e| MappingError::InvalidField(e.to_string()))?;
                    Ok(WireToolCall::function(&call.id, &call.name, arguments))
                })
                .collect::<Result<Vec<_>, MappingError>>()?;
            wire.tool_calls = Some(calls);
        }
        _ => {}
    }

    Ok(wire)
}

/// Convert a wire message to the unified model.
///
/// A tool-role message must carry its call id; an empty payload maps to an
/// explicit empty-string result, not null-absence.
pub fn core_message_from_wire(msg: &WireMessage) -> Result<Message, MappingError> {
    let role: Role = msg.role.into();

    if role == Role::Tool && msg.tool_call_id.is_none() {
        return Err(MappingError::MissingCallId);
    }

    let tool_calls = match msg.tool_calls.as_ref() {
        Some(calls) => Some(
            calls
                .iter()
                .map(core_tool_call_from_wire)
                .collect::<Result<Vec<_>, MappingError>>()?,
        ),
        None => None,
    };

    Ok(Message {
        id: msg.id.clone(),
        role,
        content: msg.content.clone(),
        tool_calls,
        tool_call_id: msg.tool_call_id.clone(),
    })
}

fn core_tool_call_from_wire(call: &WireToolCall) -> Result<ToolCall, MappingError> {
    let raw = call.function.arguments.trim();
    let arguments: Value = if raw.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(raw).map_err(|e| {
            MappingError::InvalidField(format!("tool call `{}` arguments: {e}", call.id))
        })?
    };
    Ok(ToolCall::new(&call.id, &call.function.name, arguments))
}

/// Convert a message history to wire form, preserving order.
pub fn wire_messages_from_core(messages: &[Message]) -> Result<Vec<WireMessage>, MappingError> {
    messages.iter().map(wire_message_from_core).collect()
}
