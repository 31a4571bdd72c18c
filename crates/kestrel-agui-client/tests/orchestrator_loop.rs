#![allow(missing_docs)]

//! End-to-end tests of the multi-turn tool loop against a scripted
//! transport.

use async_trait::async_trait;
use futures::StreamExt;
use kestrel_agui_client::{
    AgUiAgent, AgUiThread, AgentStreamEvent, AgentTransport, ClientError, EventStream,
    TransportError,
};
use kestrel_contract::{
    Message, Role, Tool, ToolDescriptor, ToolError, ToolRegistry, ToolResult, UpdateContent,
};
use kestrel_protocol_ag_ui::{Event, RunAgentInput};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Transport that replays pre-scripted event sequences, one per run, and
/// records every request it receives.
struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<Event>>>,
    requests: Mutex<Vec<RunAgentInput>>,
    /// When set, every stream stays open after its scripted events.
    hang_after_events: bool,
}

impl ScriptedTransport {
    fn new(scripts: Vec<Vec<Event>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            hang_after_events: false,
        }
    }

    fn hanging(scripts: Vec<Vec<Event>>) -> Self {
        Self {
            hang_after_events: true,
            ..Self::new(scripts)
        }
    }

    fn requests(&self) -> Vec<RunAgentInput> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn open(&self, input: &RunAgentInput) -> Result<EventStream, TransportError> {
        self.requests.lock().unwrap().push(input.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Connect("no scripted run left".to_string()))?;
        let events = futures::stream::iter(script.into_iter().map(Ok));
        if self.hang_after_events {
            Ok(Box::pin(events.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(events))
        }
    }
}

struct WeatherTool {
    invocations: AtomicUsize,
}

impl WeatherTool {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("GetWeather", "Get the weather for a location").with_parameters(json!({
            "type": "object",
            "properties": { "location": { "type": "string" } },
            "required": ["location"]
        }))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::success(
            "GetWeather",
            json!({"location": args["location"], "conditions": "sunny"}),
        ))
    }
}

/// Completes after a configurable delay; used to scramble completion order.
struct SleepyTool {
    name: &'static str,
    delay: Duration,
}

#[async_trait]
impl Tool for SleepyTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name, "Sleeps, then answers")
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(ToolResult::success(self.name, json!({"tool": self.name})))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("explode", "Always fails")
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed("Intentional failure".to_string()))
    }
}

fn text_run(thread_id: &str, run_id: &str, message_id: &str, text: &str) -> Vec<Event> {
    vec![
        Event::run_started(thread_id, run_id),
        Event::text_message_start(message_id),
        Event::text_message_content(message_id, text),
        Event::text_message_end(message_id),
        Event::run_finished(thread_id, run_id, None),
    ]
}

#[tokio::test]
async fn text_only_run_returns_final_text() {
    let transport = ScriptedTransport::new(vec![vec![
        Event::run_started("t1", "r1"),
        Event::text_message_start("msg1"),
        Event::text_message_content("msg1", "Hello"),
        Event::text_message_content("msg1", " World"),
        Event::text_message_end("msg1"),
        Event::run_finished("t1", "r1", None),
    ]]);
    let agent = AgUiAgent::new(transport);
    let mut thread = AgUiThread::with_id("t1");

    let response = agent
        .run(&mut thread, vec![Message::user("Hi")])
        .await
        .unwrap();

    assert_eq!(response.text(), "Hello World");
    assert!(!response.has_unresolved_calls());

    assert_eq!(thread.message_count(), 2);
    assert_eq!(thread.messages()[0].role, Role::User);
    assert_eq!(thread.messages()[1].role, Role::Assistant);
    assert_eq!(thread.messages()[1].content, "Hello World");
}

#[tokio::test]
async fn tool_call_round_trip_issues_follow_up_run() {
    let transport = ScriptedTransport::new(vec![
        vec![
            Event::run_started("t1", "r1"),
            Event::tool_call_start("call1", "GetWeather", None),
            Event::tool_call_args("call1", r#"{"location":"#),
            Event::tool_call_args("call1", r#""Seattle"}"#),
            Event::tool_call_end("call1"),
            Event::run_finished("t1", "r1", None),
        ],
        text_run("t1", "r2", "msg2", "It is sunny in Seattle."),
    ]);
    let weather = WeatherTool::new();
    let agent = AgUiAgent::new(transport)
        .with_tools(ToolRegistry::new().with_tool(weather.clone()));
    let mut thread = AgUiThread::with_id("t1");

    let response = agent
        .run(&mut thread, vec![Message::user("Weather in Seattle?")])
        .await
        .unwrap();

    assert_eq!(weather.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(response.text(), "It is sunny in Seattle.");

    // user, assistant(tool_calls), tool result, assistant(final)
    assert_eq!(thread.message_count(), 4);
    let assistant = &thread.messages()[1];
    assert!(assistant.has_tool_calls());
    assert_eq!(assistant.tool_calls()[0].arguments["location"], "Seattle");

    let tool_msg = &thread.messages()[2];
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call1"));
    let payload: Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(payload["status"], "success");
    assert_eq!(payload["data"]["location"], "Seattle");

    let requests = agent_requests(&agent);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].thread_id, requests[1].thread_id);
    assert_ne!(requests[0].run_id, requests[1].run_id, "run id must be fresh");
    // The follow-up run carries the tool result on the wire.
    let wire_tool_msg = requests[1]
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call1"))
        .expect("follow-up request should carry the tool result");
    assert!(wire_tool_msg.content.contains("sunny"));
}

fn agent_requests(agent: &AgUiAgent<ScriptedTransport>) -> Vec<RunAgentInput> {
    agent.transport().requests()
}

#[tokio::test]
async fn tool_results_keep_original_call_order() {
    let transport = ScriptedTransport::new(vec![
        vec![
            Event::run_started("t1", "r1"),
            Event::tool_call_start("call_a", "slow", None),
            Event::tool_call_end("call_a"),
            Event::tool_call_start("call_b", "medium", None),
            Event::tool_call_end("call_b"),
            Event::tool_call_start("call_c", "fast", None),
            Event::tool_call_end("call_c"),
            Event::run_finished("t1", "r1", None),
        ],
        text_run("t1", "r2", "msg2", "done"),
    ]);
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(SleepyTool {
            name: "slow",
            delay: Duration::from_millis(60),
        }))
        .with_tool(Arc::new(SleepyTool {
            name: "medium",
            delay: Duration::from_millis(30),
        }))
        .with_tool(Arc::new(SleepyTool {
            name: "fast",
            delay: Duration::from_millis(5),
        }));
    let agent = AgUiAgent::new(transport).with_tools(registry);
    let mut thread = AgUiThread::with_id("t1");

    agent
        .run(&mut thread, vec![Message::user("go")])
        .await
        .unwrap();

    // Completion order is fast → medium → slow, but history order must be
    // the original call order.
    let tool_order: Vec<&str> = thread
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.tool_call_id.as_deref().unwrap())
        .collect();
    assert_eq!(tool_order, vec!["call_a", "call_b", "call_c"]);
}

#[tokio::test]
async fn unknown_tool_disables_the_whole_turn() {
    let transport = ScriptedTransport::new(vec![vec![
        Event::run_started("t1", "r1"),
        Event::tool_call_start("call1", "GetWeather", None),
        Event::tool_call_args("call1", r#"{"location":"Seattle"}"#),
        Event::tool_call_end("call1"),
        Event::tool_call_start("call2", "TransferMoney", None),
        Event::tool_call_args("call2", r#"{"amount":100}"#),
        Event::tool_call_end("call2"),
        Event::run_finished("t1", "r1", None),
    ]]);
    let weather = WeatherTool::new();
    let agent = AgUiAgent::new(transport)
        .with_tools(ToolRegistry::new().with_tool(weather.clone()));
    let mut thread = AgUiThread::with_id("t1");

    let response = agent
        .run(&mut thread, vec![Message::user("do both")])
        .await
        .unwrap();

    // All-or-nothing: the known tool must not run either.
    assert_eq!(weather.invocations.load(Ordering::SeqCst), 0);
    assert_eq!(response.unresolved_calls.len(), 2);
    assert_eq!(response.unresolved_calls[1].name, "TransferMoney");

    // Exactly one run; no tool messages appended.
    assert_eq!(agent_requests(&agent).len(), 1);
    assert!(thread.messages().iter().all(|m| m.role != Role::Tool));
    assert!(thread.messages()[1].has_tool_calls());
}

#[tokio::test]
async fn failing_tool_becomes_error_result_and_loop_continues() {
    let transport = ScriptedTransport::new(vec![
        vec![
            Event::run_started("t1", "r1"),
            Event::tool_call_start("call1", "explode", None),
            Event::tool_call_end("call1"),
            Event::run_finished("t1", "r1", None),
        ],
        text_run("t1", "r2", "msg2", "that failed, sorry"),
    ]);
    let agent = AgUiAgent::new(transport)
        .with_tools(ToolRegistry::new().with_tool(Arc::new(FailingTool)));
    let mut thread = AgUiThread::with_id("t1");

    let response = agent
        .run(&mut thread, vec![Message::user("go")])
        .await
        .unwrap();

    // The exception was absorbed, a follow-up run was issued.
    assert_eq!(agent_requests(&agent).len(), 2);
    assert_eq!(response.text(), "that failed, sorry");

    let tool_msg = thread
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call1"));
    let payload: Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(payload["status"], "error");
    assert!(payload["message"]
        .as_str()
        .unwrap()
        .contains("Intentional failure"));

    let error_results: Vec<_> = response
        .updates
        .iter()
        .flat_map(|u| &u.contents)
        .filter(|c| matches!(c, UpdateContent::FunctionResult { call_id, .. } if call_id == "call1"))
        .collect();
    assert_eq!(error_results.len(), 1);
}

#[tokio::test]
async fn round_cap_returns_last_response_as_is() {
    let tool_turn = |run: &str, call: &str| {
        vec![
            Event::run_started("t1", run),
            Event::tool_call_start(call, "GetWeather", None),
            Event::tool_call_args(call, r#"{"location":"Seattle"}"#),
            Event::tool_call_end(call),
            Event::run_finished("t1", run, None),
        ]
    };
    let transport =
        ScriptedTransport::new(vec![tool_turn("r1", "call1"), tool_turn("r2", "call2")]);
    let weather = WeatherTool::new();
    let agent = AgUiAgent::new(transport)
        .with_tools(ToolRegistry::new().with_tool(weather.clone()))
        .with_max_tool_rounds(1);
    let mut thread = AgUiThread::with_id("t1");

    let response = agent
        .run(&mut thread, vec![Message::user("loop forever")])
        .await
        .expect("hitting the cap is not an error");

    // One tool round ran, then the second batch was returned unexecuted.
    assert_eq!(weather.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(agent_requests(&agent).len(), 2);
    assert_eq!(response.unresolved_calls.len(), 1);
    assert_eq!(response.unresolved_calls[0].id, "call2");
}

#[tokio::test]
async fn run_error_is_soft_content_not_a_failure() {
    let transport = ScriptedTransport::new(vec![vec![
        Event::run_started("t1", "r1"),
        Event::text_message_start("msg1"),
        Event::text_message_content("msg1", "partial answer"),
        Event::run_error("backend died", Some("502".to_string())),
    ]]);
    let agent = AgUiAgent::new(transport);
    let mut thread = AgUiThread::with_id("t1");

    let response = agent
        .run(&mut thread, vec![Message::user("hi")])
        .await
        .expect("RUN_ERROR is content, not an Err");

    assert!(response.updates.iter().any(|u| u.has_error()));
    assert_eq!(response.text(), "partial answer");
    // No follow-up run after an errored one.
    assert_eq!(agent_requests(&agent).len(), 1);
}

#[tokio::test]
async fn protocol_violation_unwinds_the_run() {
    let transport = ScriptedTransport::new(vec![vec![
        Event::run_started("t1", "r1"),
        Event::text_message_start("msg1"),
        Event::text_message_start("msg2"),
    ]]);
    let agent = AgUiAgent::new(transport);
    let mut thread = AgUiThread::with_id("t1");

    let err = agent
        .run(&mut thread, vec![Message::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    // No partial turn was committed.
    assert_eq!(thread.message_count(), 0);
}

#[tokio::test]
async fn transport_failure_keeps_completed_turns() {
    // One scripted run only: the follow-up open() fails.
    let transport = ScriptedTransport::new(vec![vec![
        Event::run_started("t1", "r1"),
        Event::tool_call_start("call1", "GetWeather", None),
        Event::tool_call_args("call1", r#"{"location":"Seattle"}"#),
        Event::tool_call_end("call1"),
        Event::run_finished("t1", "r1", None),
    ]]);
    let agent = AgUiAgent::new(transport)
        .with_tools(ToolRegistry::new().with_tool(WeatherTool::new()));
    let mut thread = AgUiThread::with_id("t1");

    let err = agent
        .run(&mut thread, vec![Message::user("weather?")])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));

    // The first run and its tool sub-turn were committed before the failure.
    assert_eq!(thread.message_count(), 3);
    assert_eq!(thread.messages()[2].role, Role::Tool);
}

#[tokio::test]
async fn precancelled_token_stops_before_any_run() {
    let transport = ScriptedTransport::new(vec![text_run("t1", "r1", "msg1", "never seen")]);
    let agent = AgUiAgent::new(transport);
    let mut thread = AgUiThread::with_id("t1");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = agent
        .run_with_cancellation(&mut thread, vec![Message::user("hi")], cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(agent_requests(&agent).len(), 0);
    assert_eq!(thread.message_count(), 0);
}

#[tokio::test]
async fn cancellation_mid_stream_discards_the_turn() {
    // The stream never finishes; cancellation must abort the wait.
    let transport = ScriptedTransport::hanging(vec![vec![
        Event::run_started("t1", "r1"),
        Event::text_message_start("msg1"),
        Event::text_message_content("msg1", "partial"),
    ]]);
    let agent = AgUiAgent::new(transport);
    let mut thread = AgUiThread::with_id("t1");

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = agent
        .run_with_cancellation(&mut thread, vec![Message::user("hi")], cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    // Mutation is turn-boundary only; the aborted run committed nothing.
    assert_eq!(thread.message_count(), 0);
}

#[tokio::test]
async fn run_stream_yields_updates_then_completion() {
    let transport = ScriptedTransport::new(vec![vec![
        Event::run_started("t1", "r1"),
        Event::text_message_start("msg1"),
        Event::text_message_content("msg1", "Hello"),
        Event::text_message_content("msg1", " World"),
        Event::text_message_end("msg1"),
        Event::run_finished("t1", "r1", None),
    ]]);
    let agent = AgUiAgent::new(transport);
    let thread = AgUiThread::with_id("t1");

    let mut updates = Vec::new();
    let mut completed = None;
    {
        let mut stream = agent.run_stream(thread, vec![Message::user("Hi")]);
        while let Some(event) = stream.next().await {
            match event {
                AgentStreamEvent::Update(update) => updates.push(update),
                AgentStreamEvent::Completed { thread, response } => {
                    completed = Some((thread, response));
                }
                AgentStreamEvent::Failed(err) => panic!("unexpected failure: {err}"),
            }
        }
    }

    // RUN_STARTED, MessageStart, two deltas, RUN_FINISHED.
    assert_eq!(updates.len(), 5);
    let streamed_text: String = updates.iter().map(|u| u.text()).collect();
    assert_eq!(streamed_text, "Hello World");

    let (thread, response) = completed.expect("stream must end with Completed");
    assert_eq!(response.text(), "Hello World");
    assert_eq!(thread.message_count(), 2);
}

#[tokio::test]
async fn empty_tool_arguments_invoke_with_no_arguments() {
    struct NoArgTool;

    #[async_trait]
    impl Tool for NoArgTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("ping", "No arguments needed")
        }

        async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
            assert_eq!(args, json!({}));
            Ok(ToolResult::success("ping", json!("pong")))
        }
    }

    let transport = ScriptedTransport::new(vec![
        vec![
            Event::run_started("t1", "r1"),
            Event::tool_call_start("call1", "ping", None),
            Event::tool_call_end("call1"),
            Event::run_finished("t1", "r1", None),
        ],
        text_run("t1", "r2", "msg2", "pong received"),
    ]);
    let agent =
        AgUiAgent::new(transport).with_tools(ToolRegistry::new().with_tool(Arc::new(NoArgTool)));
    let mut thread = AgUiThread::with_id("t1");

    let response = agent
        .run(&mut thread, vec![Message::user("ping")])
        .await
        .unwrap();
    assert_eq!(response.text(), "pong received");
}
