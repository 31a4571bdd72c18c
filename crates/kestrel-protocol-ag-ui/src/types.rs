//! AG-UI request and message wire shapes.

use crate::mapper::MappingError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role for AG-UI input/output messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    Developer,
    System,
    #[default]
    Assistant,
    User,
    Tool,
}

/// One tool call carried on an assistant wire message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireToolCall {
    /// Call identifier.
    pub id: String,
    /// Always `"function"` on the wire.
    #[serde(rename = "type")]
    pub call_type: String,
    /// Called function name and JSON-encoded arguments.
    pub function: WireFunction,
}

/// Function payload of a [`WireToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireFunction {
    pub name: String,
    /// Arguments as a JSON-encoded string.
    pub arguments: String,
}

impl WireToolCall {
    /// Create a function tool call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: WireFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// AG-UI message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    /// Message role.
    pub role: WireRole,
    /// Message content.
    pub content: String,
    /// Optional message ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool call ID (present only when role = tool).
    #[serde(rename = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(rename = "toolCalls", skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl WireMessage {
    fn base(role: WireRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            id: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(WireRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(WireRole::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::base(WireRole::System, content)
    }

    /// Create a developer message.
    pub fn developer(content: impl Into<String>) -> Self {
        Self::base(WireRole::Developer, content)
    }

    /// Create a tool result message.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::base(WireRole::Tool, content)
        }
    }

    /// Set the message id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// AG-UI tool definition advertised to the remote agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireTool {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for tool parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl WireTool {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    /// Set the JSON Schema parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// AG-UI context entry forwarded with the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEntry {
    /// Human-readable description of the context.
    pub description: String,
    /// The context value.
    pub value: Value,
}

/// Request to run an AG-UI agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAgentInput {
    /// Thread identifier.
    #[serde(rename = "threadId")]
    pub thread_id: String,
    /// Run identifier — fresh per invocation, even on a reused thread.
    #[serde(rename = "runId")]
    pub run_id: String,
    /// Conversation messages.
    pub messages: Vec<WireMessage>,
    /// Available tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    /// Free-form context entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ContextEntry>,
    /// Opaque state blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// Additional forwarded properties from client runtimes.
    #[serde(
        rename = "forwardedProps",
        alias = "forwarded_props",
        skip_serializing_if = "Option::is_none"
    )]
    pub forwarded_props: Option<Value>,
}

impl RunAgentInput {
    /// Create a new request with minimal required fields.
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            context: Vec::new(),
            state: None,
            forwarded_props: None,
        }
    }

    /// Add a message.
    #[must_use]
    pub fn with_message(mut self, message: WireMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Add messages.
    #[must_use]
    pub fn with_messages(mut self, messages: impl IntoIterator<Item = WireMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Add tool definitions.
    #[must_use]
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = WireTool>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Add context entries.
    #[must_use]
    pub fn with_context(mut self, context: impl IntoIterator<Item = ContextEntry>) -> Self {
        self.context.extend(context);
        self
    }

    /// Set the state blob.
    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Set forwarded props.
    #[must_use]
    pub fn with_forwarded_props(mut self, forwarded_props: Value) -> Self {
        self.forwarded_props = Some(forwarded_props);
        self
    }

    /// Validate the request.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.thread_id.is_empty() {
            return Err(MappingError::InvalidField(
                "threadId cannot be empty".to_string(),
            ));
        }
        if self.run_id.is_empty() {
            return Err(MappingError::InvalidField(
                "runId cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
