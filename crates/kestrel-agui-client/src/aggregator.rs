//! Event aggregation: folds the ordered frame stream of one run into
//! ordered application-level updates.
//!
//! The aggregator is a state machine over three states — idle, one open
//! text message, one open tool call — and enforces the protocol's bracket
//! invariants: at most one message or tool call open at a time, and every
//! content/end frame must reference the currently open id. Any violation is
//! fatal to the run and surfaced immediately.

use crate::error::ProtocolViolation;
use kestrel_contract::{AgentUpdate, Role, UpdateContent};
use kestrel_protocol_ag_ui::Event;
use serde_json::Value;

/// A tool call whose argument deltas are still being collected.
#[derive(Debug, Clone)]
struct PendingToolCall {
    call_id: String,
    name: String,
    parent_message_id: Option<String>,
    /// Raw concatenated argument deltas; parsed only at TOOL_CALL_END.
    arguments: String,
}

#[derive(Debug, Clone)]
enum AggregatorState {
    Idle,
    MessageOpen { message_id: String, role: Role },
    ToolCallOpen(PendingToolCall),
    Finished,
}

impl AggregatorState {
    fn describe(&self) -> String {
        match self {
            Self::Idle => "idle".to_string(),
            Self::MessageOpen { message_id, .. } => format!("message `{message_id}` is open"),
            Self::ToolCallOpen(pending) => format!("tool call `{}` is open", pending.call_id),
            Self::Finished => "the run is finished".to_string(),
        }
    }
}

/// State machine consuming one run's ordered event sequence.
#[derive(Debug)]
pub struct EventAggregator {
    state: AggregatorState,
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventAggregator {
    /// Create an aggregator in the idle state.
    pub fn new() -> Self {
        Self {
            state: AggregatorState::Idle,
        }
    }

    /// True once the run has seen RUN_FINISHED or RUN_ERROR.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, AggregatorState::Finished)
    }

    /// Apply one event, returning the update it produces, if any.
    ///
    /// Transitions attempted from an incompatible state, or referencing an
    /// id other than the one currently open, fail with
    /// [`ProtocolViolation`] carrying the offending ids.
    pub fn apply(&mut self, event: Event) -> Result<Option<AgentUpdate>, ProtocolViolation> {
        match event {
            Event::RunStarted {
                thread_id, run_id, ..
            } => {
                self.require_idle("RUN_STARTED")?;
                Ok(Some(
                    AgentUpdate::of(UpdateContent::RunStarted {
                        thread_id,
                        run_id: run_id.clone(),
                    })
                    .with_response_id(run_id),
                ))
            }

            Event::RunFinished {
                thread_id,
                run_id,
                result,
                ..
            } => {
                self.require_idle("RUN_FINISHED")?;
                self.state = AggregatorState::Finished;
                Ok(Some(
                    AgentUpdate::of(UpdateContent::RunFinished {
                        thread_id,
                        run_id: run_id.clone(),
                        result,
                    })
                    .with_response_id(run_id),
                ))
            }

            Event::RunError { message, code, .. } => {
                // A soft error: content in the stream, not a thrown failure.
                // Legal anywhere in the run; abandons any open bracket.
                if matches!(self.state, AggregatorState::Finished) {
                    return Err(self.unexpected("RUN_ERROR"));
                }
                self.state = AggregatorState::Finished;
                Ok(Some(AgentUpdate::of(UpdateContent::Error {
                    message,
                    code,
                })))
            }

            Event::TextMessageStart {
                message_id, role, ..
            } => {
                self.require_idle("TEXT_MESSAGE_START")?;
                let role: Role = role.into();
                self.state = AggregatorState::MessageOpen {
                    message_id: message_id.clone(),
                    role,
                };
                Ok(Some(
                    AgentUpdate::of(UpdateContent::MessageStart)
                        .with_role(role)
                        .with_message_id(message_id),
                ))
            }

            Event::TextMessageContent {
                message_id, delta, ..
            } => match &self.state {
                AggregatorState::MessageOpen {
                    message_id: open,
                    role,
                } if *open == message_id => Ok(Some(
                    AgentUpdate::of(UpdateContent::TextDelta(delta))
                        .with_role(*role)
                        .with_message_id(message_id),
                )),
                AggregatorState::MessageOpen { message_id: open, .. } => {
                    Err(ProtocolViolation::IdMismatch {
                        event: "TEXT_MESSAGE_CONTENT",
                        expected: open.clone(),
                        got: message_id,
                    })
                }
                _ => Err(self.unexpected("TEXT_MESSAGE_CONTENT")),
            },

            Event::TextMessageEnd { message_id, .. } => match &self.state {
                AggregatorState::MessageOpen { message_id: open, .. } if *open == message_id => {
                    self.state = AggregatorState::Idle;
                    Ok(None)
                }
                AggregatorState::MessageOpen { message_id: open, .. } => {
                    Err(ProtocolViolation::IdMismatch {
                        event: "TEXT_MESSAGE_END",
                        expected: open.clone(),
                        got: message_id,
                    })
                }
                _ => Err(self.unexpected("TEXT_MESSAGE_END")),
            },

            Event::ToolCallStart {
                tool_call_id,
                tool_call_name,
                parent_message_id,
                ..
            } => {
                self.require_idle("TOOL_CALL_START")?;
                self.state = AggregatorState::ToolCallOpen(PendingToolCall {
                    call_id: tool_call_id,
                    name: tool_call_name,
                    parent_message_id,
                    arguments: String::new(),
                });
                Ok(None)
            }

            Event::ToolCallArgs {
                tool_call_id,
                delta,
                ..
            } => match &mut self.state {
                AggregatorState::ToolCallOpen(pending) if pending.call_id == tool_call_id => {
                    // Raw concatenation; no validation until finalize.
                    pending.arguments.push_str(&delta);
                    Ok(None)
                }
                AggregatorState::ToolCallOpen(pending) => Err(ProtocolViolation::IdMismatch {
                    event: "TOOL_CALL_ARGS",
                    expected: pending.call_id.clone(),
                    got: tool_call_id,
                }),
                _ => Err(self.unexpected("TOOL_CALL_ARGS")),
            },

            Event::ToolCallEnd { tool_call_id, .. } => match &self.state {
                AggregatorState::ToolCallOpen(pending) if pending.call_id == tool_call_id => {
                    let pending = pending.clone();
                    self.state = AggregatorState::Idle;
                    let arguments = parse_arguments(&pending.call_id, &pending.arguments)?;
                    let mut update = AgentUpdate::of(UpdateContent::FunctionCall {
                        call_id: pending.call_id,
                        name: pending.name,
                        arguments,
                        parent_message_id: pending.parent_message_id.clone(),
                    })
                    .with_role(Role::Assistant);
                    update.message_id = pending.parent_message_id;
                    Ok(Some(update))
                }
                AggregatorState::ToolCallOpen(pending) => Err(ProtocolViolation::IdMismatch {
                    event: "TOOL_CALL_END",
                    expected: pending.call_id.clone(),
                    got: tool_call_id,
                }),
                _ => Err(self.unexpected("TOOL_CALL_END")),
            },
        }
    }

    /// Reject a stream that ended inside an open bracket.
    pub fn finish(&self) -> Result<(), ProtocolViolation> {
        match &self.state {
            AggregatorState::Idle | AggregatorState::Finished => Ok(()),
            AggregatorState::MessageOpen { message_id, .. } => {
                Err(ProtocolViolation::TruncatedStream {
                    open: format!("message `{message_id}`"),
                })
            }
            AggregatorState::ToolCallOpen(pending) => Err(ProtocolViolation::TruncatedStream {
                open: format!("tool call `{}`", pending.call_id),
            }),
        }
    }

    fn require_idle(&self, event: &'static str) -> Result<(), ProtocolViolation> {
        match self.state {
            AggregatorState::Idle => Ok(()),
            _ => Err(self.unexpected(event)),
        }
    }

    fn unexpected(&self, event: &'static str) -> ProtocolViolation {
        ProtocolViolation::UnexpectedEvent {
            event,
            state: self.state.describe(),
        }
    }
}

/// Parse an accumulated argument buffer at TOOL_CALL_END.
///
/// An empty or blank buffer means no arguments, not an error.
fn parse_arguments(call_id: &str, buffer: &str) -> Result<Value, ProtocolViolation> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(trimmed).map_err(|e| ProtocolViolation::MalformedArguments {
        call_id: call_id.to_string(),
        reason: e.to_string(),
    })
}
