//! Application-level response updates produced by aggregating a run's
//! event stream.

use crate::types::{Message, Role, ToolCall};
use serde_json::Value;

/// One ordered content item inside an [`AgentUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateContent {
    /// Incremental text content for the open message.
    TextDelta(String),
    /// A completed tool call request with parsed arguments.
    FunctionCall {
        call_id: String,
        name: String,
        arguments: Value,
        parent_message_id: Option<String>,
    },
    /// The result of a locally executed tool call.
    FunctionResult { call_id: String, result: Value },
    /// A soft run error delivered as content within the stream.
    Error {
        message: String,
        code: Option<String>,
    },
    /// Run lifecycle marker.
    RunStarted { thread_id: String, run_id: String },
    /// Run lifecycle marker with the optional final result payload.
    RunFinished {
        thread_id: String,
        run_id: String,
        result: Option<Value>,
    },
    /// A text message opened; role and id are on the update envelope.
    MessageStart,
}

impl UpdateContent {
    /// True for lifecycle/metadata-only content.
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. } | Self::RunFinished { .. } | Self::MessageStart
        )
    }
}

/// An ordered application-level update emitted by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentUpdate {
    /// Role of the message this update belongs to, when known.
    pub role: Option<Role>,
    /// Wire message id this update belongs to, when known.
    pub message_id: Option<String>,
    /// Run id this update belongs to, when known.
    pub response_id: Option<String>,
    /// Ordered content items.
    pub contents: Vec<UpdateContent>,
}

impl AgentUpdate {
    /// Create an update with a single content item and no envelope fields.
    pub fn of(content: UpdateContent) -> Self {
        Self {
            role: None,
            message_id: None,
            response_id: None,
            contents: vec![content],
        }
    }

    /// Set the role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Set the message id.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Set the run id.
    #[must_use]
    pub fn with_response_id(mut self, response_id: impl Into<String>) -> Self {
        self.response_id = Some(response_id.into());
        self
    }

    /// Concatenated text-delta content of this update.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|c| match c {
                UpdateContent::TextDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Function calls carried by this update.
    pub fn function_calls(&self) -> Vec<ToolCall> {
        self.contents
            .iter()
            .filter_map(|c| match c {
                UpdateContent::FunctionCall {
                    call_id,
                    name,
                    arguments,
                    ..
                } => Some(ToolCall::new(call_id, name, arguments.clone())),
                _ => None,
            })
            .collect()
    }

    /// True if any content item is an error.
    pub fn has_error(&self) -> bool {
        self.contents
            .iter()
            .any(|c| matches!(c, UpdateContent::Error { .. }))
    }
}

/// Accumulated outcome of one orchestrated agent invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentRunResponse {
    /// Every update emitted across all runs of the invocation, in order.
    pub updates: Vec<AgentUpdate>,
    /// New messages produced by the invocation (assistant and tool turns),
    /// in history order.
    pub messages: Vec<Message>,
    /// Tool calls from the final turn that were returned unexecuted
    /// (not locally invocable, or the round cap was reached).
    pub unresolved_calls: Vec<ToolCall>,
}

impl AgentRunResponse {
    /// Concatenated text across all updates.
    pub fn text(&self) -> String {
        self.updates.iter().map(|u| u.text()).collect()
    }

    /// True when the remote agent requested calls this invocation could not
    /// execute; the caller is expected to resolve them externally.
    pub fn has_unresolved_calls(&self) -> bool {
        !self.unresolved_calls.is_empty()
    }
}
