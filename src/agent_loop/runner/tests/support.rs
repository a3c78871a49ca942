use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::super::super::events::{RunEvent, RunEventSink};
use super::super::Runner;
use crate::error::TurnstileError;
use crate::provider::{Provider, ProviderRequest, ProviderResponse, ProviderStream};
use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolSet};
use crate::types::{Message, StopReason, StreamEvent, ToolCall, ToolResult, Usage};

#[derive(Clone, Copy, Debug)]
pub(super) enum ProviderScenario {
    /// Text "hello" on every call.
    Greeting,
    /// One "lookup" call (`call_{n}`) on every call.
    AlwaysCallsLookup,
    /// Calls `c1` lookup and `c2` delete on call 0, then text "done".
    LookupAndDeleteThenDone,
    /// An unparseable "lookup" call on call 0, then text "done".
    ParseErrorThenDone,
    /// Four "lookup" calls on call 0, then text "done".
    FourLookupsThenDone,
    /// Text "answer" with a "lookup" call attached, on every call.
    TextWithToolCall,
    /// A lookup call, a blank answer, then "final answer".
    ToolThenBlankThenAnswer,
    /// A lookup call, then blank answers forever.
    ToolThenBlank,
    /// A call to "files.read" on call 0, then text "done".
    DottedNameThenDone,
    /// A call to an unregistered tool on call 0, then text "done".
    UnknownToolThenDone,
    /// Lookup `c1`, then delete reusing `c1`, on call 0, then text "done".
    DuplicateIdsThenDone,
    /// Text "answer" with a `tool_use` stop reason and no calls.
    ToolUseWithoutCalls,
}

fn text_reply(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        stop_reason: StopReason::EndTurn,
    }
}

fn calls_reply(text: &str, calls: Vec<ToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls(text, calls),
        usage: Some(Usage::new(10, 5)),
        stop_reason: StopReason::ToolUse,
    }
}

fn lookup(id: &str) -> ToolCall {
    ToolCall::new(id, "lookup", serde_json::json!({ "q": id }))
}

impl ProviderScenario {
    fn reply(self, call_index: usize) -> ProviderResponse {
        match (self, call_index) {
            (Self::Greeting, _) => text_reply("hello"),
            (Self::AlwaysCallsLookup, n) => calls_reply("", vec![lookup(&format!("call_{n}"))]),
            (Self::LookupAndDeleteThenDone, 0) => calls_reply(
                "",
                vec![
                    lookup("c1"),
                    ToolCall::new("c2", "delete", serde_json::json!({ "path": "/tmp/x" })),
                ],
            ),
            (Self::ParseErrorThenDone, 0) => calls_reply(
                "",
                vec![ToolCall::from_raw("bad", "lookup", "{\"q\": ", 1024)],
            ),
            (Self::FourLookupsThenDone, 0) => calls_reply(
                "",
                (1..=4).map(|i| lookup(&format!("c{i}"))).collect(),
            ),
            (Self::TextWithToolCall, _) => calls_reply("answer", vec![lookup("c1")]),
            (Self::ToolThenBlankThenAnswer, 0) | (Self::ToolThenBlank, 0) => {
                calls_reply("", vec![lookup("c1")])
            }
            (Self::ToolThenBlankThenAnswer, 1) | (Self::ToolThenBlank, _) => text_reply(""),
            (Self::ToolThenBlankThenAnswer, _) => text_reply("final answer"),
            (Self::DottedNameThenDone, 0) => calls_reply(
                "",
                vec![ToolCall::new("c1", "files.read", serde_json::json!({ "path": "a.txt" }))],
            ),
            (Self::UnknownToolThenDone, 0) => calls_reply(
                "",
                vec![ToolCall::new("c1", "nope", serde_json::json!({}))],
            ),
            (Self::DuplicateIdsThenDone, 0) => calls_reply(
                "",
                vec![
                    lookup("c1"),
                    ToolCall::new("c1", "delete", serde_json::json!({ "path": "/tmp/x" })),
                ],
            ),
            (Self::ToolUseWithoutCalls, _) => calls_reply("answer", Vec::new()),
            (_, _) => text_reply("done"),
        }
    }
}

/// Scripted provider recording every request it sees.
pub(super) struct StubProvider {
    scenario: ProviderScenario,
    calls: AtomicUsize,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl StubProvider {
    pub(super) fn new(scenario: ProviderScenario, requests: Arc<Mutex<Vec<ProviderRequest>>>) -> Self {
        Self {
            scenario,
            calls: AtomicUsize::new(0),
            requests,
        }
    }

    fn next_reply(&self, request: &ProviderRequest) -> ProviderResponse {
        self.requests
            .lock()
            .expect("request lock")
            .push(request.clone());
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.scenario.reply(call_index)
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn chat(&self, request: &ProviderRequest) -> Result<ProviderResponse, TurnstileError> {
        Ok(self.next_reply(request))
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<ProviderStream, TurnstileError> {
        let reply = self.next_reply(request);
        let text = reply.message.text();
        let mut events = Vec::new();
        if !text.is_empty() {
            events.push(StreamEvent::TextDelta { text });
        }
        events.push(StreamEvent::MessageComplete {
            message: reply.message,
        });
        events.push(StreamEvent::Done {
            stop_reason: reply.stop_reason,
            usage: reply.usage,
        });
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}

pub(super) type Requests = Arc<Mutex<Vec<ProviderRequest>>>;

pub(super) fn test_runner(scenario: ProviderScenario, tools: ToolSet) -> (Runner, Requests) {
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let provider = StubProvider::new(scenario, requests.clone());
    (Runner::new(Arc::new(provider), Arc::new(tools)), requests)
}

pub(super) fn request_count(requests: &Requests) -> usize {
    requests.lock().expect("request lock").len()
}

/// A tool answering "{name} ok" and counting its invocations.
pub(super) fn counting_tool(name: &str, counter: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    let reply = format!("{name} ok");
    Arc::new(
        AgentTool::new(name, "test tool", AgentToolParameters::empty(), move |_args, _ctx| {
            let counter = counter.clone();
            let reply = reply.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ToolResult::text(reply))
            }
        })
        .parallel(),
    )
}

/// Registry with counting "lookup" and "delete" tools.
pub(super) fn lookup_and_delete() -> (ToolSet, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let lookups = Arc::new(AtomicUsize::new(0));
    let deletes = Arc::new(AtomicUsize::new(0));
    let tools = ToolSet::new()
        .with_tool(counting_tool("lookup", lookups.clone()))
        .with_tool(counting_tool("delete", deletes.clone()));
    (tools, lookups, deletes)
}

pub(super) fn capture_events() -> (RunEventSink, Arc<Mutex<Vec<RunEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::<RunEvent>::new()));
    let sink_events = events.clone();
    let sink: RunEventSink = Arc::new(move |event| {
        if let Ok(mut guard) = sink_events.lock() {
            guard.push(event);
        }
    });
    (sink, events)
}
