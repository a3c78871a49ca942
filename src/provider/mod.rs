//! Provider seam: the LLM transport the runner talks to.
//!
//! Turnstile ships no concrete providers. Callers wrap their own client in a
//! [`Provider`] implementation; the runner only needs `chat` for synchronous
//! turns and `stream` for streaming turns.

pub mod tokens;

pub use tokens::{EstimatingTokenCounter, TokenCounter};

use async_trait::async_trait;
use bon::Builder;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::TurnstileError;
use crate::types::{Message, StopReason, StreamEvent, Usage};

/// A request sent to a provider for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// `None` when tools are not offered this turn.
    pub tools: Option<Vec<ToolDefinition>>,
    pub options: RequestOptions,
}

impl ProviderRequest {
    pub fn tools_offered(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Per-request generation options, persisted with paused runs.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// `Some(false)` limits every turn to a single tool call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Provider-specific passthrough options.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    #[builder(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RequestOptions {
    pub fn parallel_tool_calls_disabled(&self) -> bool {
        self.parallel_tool_calls == Some(false)
    }
}

/// Response from a synchronous provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub message: Message,
    pub usage: Option<Usage>,
    pub stop_reason: StopReason,
}

/// Stream of events for one streaming provider call.
pub type ProviderStream = BoxStream<'static, Result<StreamEvent, TurnstileError>>;

/// Core trait implemented by LLM transports.
///
/// Errors are handed back to the caller untouched; retry and backoff belong
/// to the implementation.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// One blocking request/response exchange.
    async fn chat(&self, request: &ProviderRequest) -> Result<ProviderResponse, TurnstileError>;

    /// Streaming exchange yielding text deltas, the completed message, then `Done`.
    async fn stream(&self, request: &ProviderRequest) -> Result<ProviderStream, TurnstileError>;
}
