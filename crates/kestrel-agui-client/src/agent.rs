//! The multi-turn tool-invocation loop.
//!
//! One `run` drives: open a transport session → aggregate the event stream →
//! execute locally registered tools → extend history → re-issue the run with
//! a fresh run id, until the remote agent stops requesting calls. The loop
//! is an explicit bounded iteration, never recursion, with cancellation
//! checks between turns.

use crate::aggregator::EventAggregator;
use crate::error::ClientError;
use crate::thread::AgUiThread;
use crate::transport::{AgentTransport, EventStream};
use async_stream::stream;
use futures::{future, Stream, StreamExt};
use kestrel_contract::{
    AgentRunResponse, AgentUpdate, Message, Role, ToolCall, ToolRegistry, ToolResult,
    UpdateContent,
};
use kestrel_protocol_ag_ui::{
    wire_messages_from_core, ContextEntry, ResultCodec, RunAgentInput, TypeRegistry, WireTool,
};
use serde_json::Value;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default cap on tool sub-turns per invocation.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Type name under which the loop's own tool results are registered with
/// the result codec.
pub const TOOL_RESULT_TYPE: &str = "tool_result";

/// Generate a fresh UUID v7 run identifier.
fn gen_run_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

fn default_result_codec() -> ResultCodec {
    ResultCodec::with_registry(TypeRegistry::new().with_type::<ToolResult>(TOOL_RESULT_TYPE))
}

/// Event yielded by [`AgUiAgent::run_stream`].
#[derive(Debug)]
pub enum AgentStreamEvent {
    /// One aggregated update, passed through as it is produced.
    Update(AgentUpdate),
    /// The loop converged; carries the updated thread and the accumulated
    /// response.
    Completed {
        thread: AgUiThread,
        response: AgentRunResponse,
    },
    /// The loop failed; the thread keeps every turn that completed before
    /// the failure.
    Failed(ClientError),
}

/// Everything one run produced, folded out of its update sequence.
struct RunOutcome {
    updates: Vec<AgentUpdate>,
    text: String,
    tool_calls: Vec<ToolCall>,
    /// A RUN_ERROR was delivered as content.
    errored: bool,
}

enum StreamStep {
    Update(AgentUpdate),
    ChannelClosed,
    Finished(Result<AgentRunResponse, ClientError>),
}

/// Client-side agent handle over a remote AG-UI endpoint.
///
/// Holds the transport, the caller-supplied tool set, and the loop limits.
/// Thread state is caller-owned and passed into each call; concurrent runs
/// against the same thread require external serialization.
pub struct AgUiAgent<T: AgentTransport> {
    transport: T,
    tools: ToolRegistry,
    codec: ResultCodec,
    max_tool_rounds: usize,
    context: Vec<ContextEntry>,
    state: Option<Value>,
    forwarded_props: Option<Value>,
}

impl<T: AgentTransport> AgUiAgent<T> {
    /// Create an agent over the given transport with no local tools.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            tools: ToolRegistry::new(),
            codec: default_result_codec(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            context: Vec::new(),
            state: None,
            forwarded_props: None,
        }
    }

    /// Set the locally invocable tool set.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Set the cap on tool sub-turns per invocation.
    #[must_use]
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    /// Replace the tool-result codec.
    #[must_use]
    pub fn with_result_codec(mut self, codec: ResultCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Attach context entries forwarded with every request.
    #[must_use]
    pub fn with_context(mut self, context: Vec<ContextEntry>) -> Self {
        self.context = context;
        self
    }

    /// Attach an opaque state blob forwarded with every request.
    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Attach forwarded properties sent with every request.
    #[must_use]
    pub fn with_forwarded_props(mut self, forwarded_props: Value) -> Self {
        self.forwarded_props = Some(forwarded_props);
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the agent to convergence, mutating the thread at turn boundaries.
    pub async fn run(
        &self,
        thread: &mut AgUiThread,
        input: Vec<Message>,
    ) -> Result<AgentRunResponse, ClientError> {
        self.run_with_cancellation(thread, input, CancellationToken::new())
            .await
    }

    /// Run the agent to convergence with a cancellation signal.
    ///
    /// On cancellation no further events are read, results of in-flight
    /// tool calls are discarded, and the thread keeps only fully completed
    /// turns.
    pub async fn run_with_cancellation(
        &self,
        thread: &mut AgUiThread,
        input: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<AgentRunResponse, ClientError> {
        self.run_core(thread, input, &cancel, None).await
    }

    /// Run the agent, streaming every aggregated update as it is produced.
    ///
    /// The thread is moved in and handed back on
    /// [`AgentStreamEvent::Completed`].
    pub fn run_stream(
        &self,
        thread: AgUiThread,
        input: Vec<Message>,
    ) -> Pin<Box<dyn Stream<Item = AgentStreamEvent> + Send + '_>> {
        self.run_stream_with_cancellation(thread, input, CancellationToken::new())
    }

    /// Streaming variant of [`AgUiAgent::run_with_cancellation`].
    pub fn run_stream_with_cancellation(
        &self,
        thread: AgUiThread,
        input: Vec<Message>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Stream<Item = AgentStreamEvent> + Send + '_>> {
        Box::pin(stream! {
            let mut thread = thread;
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut result = None;
            {
                let core = self.run_core(&mut thread, input, &cancel, Some(tx));
                tokio::pin!(core);
                loop {
                    let step = tokio::select! {
                        maybe = rx.recv() => match maybe {
                            Some(update) => StreamStep::Update(update),
                            None => StreamStep::ChannelClosed,
                        },
                        res = &mut core, if result.is_none() => StreamStep::Finished(res),
                    };
                    match step {
                        StreamStep::Update(update) => yield AgentStreamEvent::Update(update),
                        StreamStep::ChannelClosed => break,
                        StreamStep::Finished(res) => result = Some(res),
                    }
                }
            }
            match result {
                Some(Ok(response)) => yield AgentStreamEvent::Completed { thread, response },
                Some(Err(error)) => yield AgentStreamEvent::Failed(error),
                None => {}
            }
        })
    }

    /// The loop itself. `sink` receives each update as it is aggregated;
    /// the sender is dropped when the loop returns.
    async fn run_core(
        &self,
        thread: &mut AgUiThread,
        input: Vec<Message>,
        cancel: &CancellationToken,
        sink: Option<mpsc::UnboundedSender<AgentUpdate>>,
    ) -> Result<AgentRunResponse, ClientError> {
        let mut history: Vec<Message> = thread.messages().to_vec();
        history.extend(input.iter().cloned());

        // Messages awaiting the next turn boundary before they may reach
        // the thread.
        let mut pending: Vec<Message> = input;

        let mut all_updates: Vec<AgentUpdate> = Vec::new();
        let mut new_messages: Vec<Message> = Vec::new();
        let mut unresolved: Vec<ToolCall> = Vec::new();
        let mut rounds = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            let request = self.build_request(thread.id(), &history)?;
            debug!(run_id = %request.run_id, round = rounds, messages = history.len(), "issuing run");
            let stream = self.transport.open(&request).await?;
            let outcome = self.collect_run(stream, cancel, sink.as_ref()).await?;

            let assistant = if outcome.tool_calls.is_empty() {
                Message::assistant(&outcome.text)
            } else {
                Message::assistant_with_tool_calls(&outcome.text, outcome.tool_calls.clone())
            };
            history.push(assistant.clone());
            pending.push(assistant.clone());
            new_messages.push(assistant);
            all_updates.extend(outcome.updates);

            // Run completed: commit the turn.
            thread.append_turn(std::mem::take(&mut pending));

            if outcome.errored || outcome.tool_calls.is_empty() {
                break;
            }

            let missing: Vec<String> = outcome
                .tool_calls
                .iter()
                .filter(|call| !self.tools.contains(&call.name))
                .map(|call| call.name.clone())
                .collect();
            if !missing.is_empty() {
                // All-or-nothing: one unknown name means nothing runs this
                // turn; the caller resolves the calls externally.
                warn!(?missing, "tool calls not locally invocable; returning them unexecuted");
                unresolved = outcome.tool_calls;
                break;
            }

            if rounds >= self.max_tool_rounds {
                warn!(rounds, "tool round cap reached; returning last response as-is");
                unresolved = outcome.tool_calls;
                break;
            }

            let invocations = outcome.tool_calls.iter().map(|call| {
                let tool = self.tools.get(&call.name);
                let call = call.clone();
                async move {
                    match tool {
                        Some(tool) => self.invoke_tool(tool, call).await,
                        // Unreachable after the all-or-nothing check; kept as
                        // a result entry rather than a panic.
                        None => self.not_found_entry(&call),
                    }
                }
            });
            let results: Vec<(Message, AgentUpdate)> = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                results = future::join_all(invocations) => {
                    results.into_iter().collect::<Result<Vec<_>, ClientError>>()?
                }
            };

            // Results keep original call order regardless of completion
            // order: join_all preserves input order.
            let mut tool_messages = Vec::with_capacity(results.len());
            for (message, update) in results {
                if let Some(tx) = sink.as_ref() {
                    let _ = tx.send(update.clone());
                }
                all_updates.push(update);
                history.push(message.clone());
                new_messages.push(message.clone());
                tool_messages.push(message);
            }

            // Tool sub-turn completed: commit it.
            thread.append_turn(tool_messages);
            rounds += 1;
        }

        Ok(AgentRunResponse {
            updates: all_updates,
            messages: new_messages,
            unresolved_calls: unresolved,
        })
    }

    /// Consume one run's event stream through the aggregator.
    async fn collect_run(
        &self,
        mut stream: EventStream,
        cancel: &CancellationToken,
        sink: Option<&mpsc::UnboundedSender<AgentUpdate>>,
    ) -> Result<RunOutcome, ClientError> {
        let mut aggregator = EventAggregator::new();
        let mut outcome = RunOutcome {
            updates: Vec::new(),
            text: String::new(),
            tool_calls: Vec::new(),
            errored: false,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                next = stream.next() => next,
            };
            let Some(item) = next else { break };
            let event = item?;
            let Some(update) = aggregator.apply(event)? else {
                continue;
            };

            for content in &update.contents {
                match content {
                    UpdateContent::TextDelta(delta) => outcome.text.push_str(delta),
                    UpdateContent::FunctionCall {
                        call_id,
                        name,
                        arguments,
                        ..
                    } => outcome
                        .tool_calls
                        .push(ToolCall::new(call_id, name, arguments.clone())),
                    UpdateContent::Error { message, .. } => {
                        warn!(error = %message, "run reported a soft error");
                        outcome.errored = true;
                    }
                    _ => {}
                }
            }

            if let Some(tx) = sink {
                let _ = tx.send(update.clone());
            }
            outcome.updates.push(update);
        }

        aggregator.finish()?;
        Ok(outcome)
    }

    /// Invoke one tool. Every failure — argument validation, execution —
    /// is absorbed into an error function-result entry; nothing here is
    /// fatal to the loop except codec misconfiguration.
    async fn invoke_tool(
        &self,
        tool: std::sync::Arc<dyn kestrel_contract::Tool>,
        call: ToolCall,
    ) -> Result<(Message, AgentUpdate), ClientError> {
        let result = match tool.validate_args(&call.arguments) {
            Err(e) => ToolResult::error(&call.name, e.to_string()),
            Ok(()) => match tool.execute(call.arguments.clone()).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %e, "tool invocation failed");
                    ToolResult::error(&call.name, e.to_string())
                }
            },
        };
        self.result_entry(&call, result)
    }

    fn not_found_entry(&self, call: &ToolCall) -> Result<(Message, AgentUpdate), ClientError> {
        self.result_entry(
            call,
            ToolResult::error(&call.name, format!("Tool '{}' not found", call.name)),
        )
    }

    fn result_entry(
        &self,
        call: &ToolCall,
        result: ToolResult,
    ) -> Result<(Message, AgentUpdate), ClientError> {
        let payload = result.to_json();
        let content = self.codec.encode(TOOL_RESULT_TYPE, &payload)?;
        let message = Message::tool(&call.id, content);
        let update = AgentUpdate::of(UpdateContent::FunctionResult {
            call_id: call.id.clone(),
            result: payload,
        })
        .with_role(Role::Tool);
        Ok((message, update))
    }

    fn build_request(
        &self,
        thread_id: &str,
        history: &[Message],
    ) -> Result<RunAgentInput, ClientError> {
        let tools = self.tools.descriptors().into_iter().map(|descriptor| {
            WireTool::new(descriptor.name, descriptor.description)
                .with_parameters(descriptor.parameters)
        });

        let mut input = RunAgentInput::new(thread_id, gen_run_id())
            .with_messages(wire_messages_from_core(history).map_err(ClientError::Mapping)?)
            .with_tools(tools)
            .with_context(self.context.iter().cloned());
        if let Some(state) = &self.state {
            input = input.with_state(state.clone());
        }
        if let Some(props) = &self.forwarded_props {
            input = input.with_forwarded_props(props.clone());
        }
        input.validate().map_err(ClientError::Mapping)?;
        Ok(input)
    }
}
