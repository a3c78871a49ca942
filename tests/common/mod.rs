//! Shared test helpers and mock provider.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use turnstile::error::TurnstileError;
use turnstile::provider::{Provider, ProviderRequest, ProviderResponse, ProviderStream};
use turnstile::tools::{AgentTool, AgentToolParameters, Tool};
use turnstile::types::*;

/// A mock provider that returns queued responses in order.
pub struct MockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a text response.
    pub fn queue_response(&self, text: &str) {
        self.responses.lock().unwrap().push(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage::new(10, 20)),
            stop_reason: StopReason::EndTurn,
        });
    }

    /// Queue a response requesting the given tool calls.
    pub fn queue_tool_calls(&self, calls: Vec<ToolCall>) {
        self.responses.lock().unwrap().push(ProviderResponse {
            message: Message::assistant_with_tool_calls("", calls),
            usage: Some(Usage::new(10, 5)),
            stop_reason: StopReason::ToolUse,
        });
    }

    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.queue_tool_calls(vec![ToolCall::new(id, name, args)]);
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &ProviderRequest) -> ProviderResponse {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return ProviderResponse {
                message: Message::assistant("Mock response"),
                usage: Some(Usage::default()),
                stop_reason: StopReason::EndTurn,
            };
        }
        responses.remove(0)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: &ProviderRequest) -> Result<ProviderResponse, TurnstileError> {
        Ok(self.next(request))
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<ProviderStream, TurnstileError> {
        let response = self.next(request);
        let chars: Vec<char> = response.message.text().chars().collect();
        let mut events: Vec<StreamEvent> = chars
            .chunks(5)
            .map(|chunk| StreamEvent::TextDelta {
                text: chunk.iter().collect(),
            })
            .collect();
        events.push(StreamEvent::MessageComplete {
            message: response.message,
        });
        events.push(StreamEvent::Done {
            stop_reason: response.stop_reason,
            usage: response.usage,
        });
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}

/// Tool echoing its `text` argument and counting invocations.
pub fn echo_tool(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    let params = AgentToolParameters::object()
        .string("text", "Text to echo", true)
        .build();
    Arc::new(
        AgentTool::new(name, "Echo the input", params, move |args, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ToolResult::text(args.get_str("text")?.to_string()))
            }
        })
        .parallel(),
    )
}
