//! The turn loop: public entry points.
//!
//! All six entry points (`run`, `resume`, `resume_with_tool_results`, each
//! sync or streaming) feed one loop in [`engine`], parameterized by how the
//! LLM is called and what state the loop starts from.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use super::approvals::{AllowAll, ConfirmationDecision, Policy};
use super::continuation::Continuation;
use super::events::{ObserverErrorSink, RunEventSink};
use super::executor::{InlineExecutor, PooledExecutor, ToolExecutor};
use super::types::{RunId, RunOutcome};
use crate::config::RunnerConfig;
use crate::error::TurnstileError;
use crate::instrument::{Instrumenter, NoopInstrumenter};
use crate::provider::{Provider, RequestOptions, TokenCounter, ToolDefinition};
use crate::tools::ToolsRegistry;
use crate::types::{Message, StreamEvent, ToolResult};

mod control;
mod engine;
mod limits;
mod resume;
mod tooling;

#[cfg(test)]
mod tests;

use engine::{Entry, TurnDriver};

/// Callback receiving provider stream events as they arrive.
///
/// Returning an error aborts the run with that error.
pub type StreamCallback<'a> = dyn FnMut(&StreamEvent) -> Result<(), TurnstileError> + Send + 'a;

/// Input for a fresh run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub model: String,
    pub messages: Vec<Message>,
    /// Schemas to offer; `None` offers everything in the registry.
    pub tools: Option<Vec<ToolDefinition>>,
    pub options: RequestOptions,
    /// Application attributes passed to policies and tools.
    pub context_attributes: BTreeMap<String, serde_json::Value>,
}

impl RunRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            model: model.into(),
            messages,
            tools: None,
            options: RequestOptions::default(),
            context_attributes: BTreeMap::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_context_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context_attributes.insert(key.into(), value.into());
        self
    }
}

/// Options for [`Runner::resume_with_tool_results`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeOptions {
    /// Accept a subset of the pending results and pause again for the rest.
    pub allow_partial: bool,
}

impl ResumeOptions {
    pub fn partial() -> Self {
        Self {
            allow_partial: true,
        }
    }
}

/// Drives runs against a provider, a tool registry, and a policy.
#[derive(Clone)]
pub struct Runner {
    provider: Arc<dyn Provider>,
    registry: Arc<dyn ToolsRegistry>,
    policy: Arc<dyn Policy>,
    executor: Arc<dyn ToolExecutor>,
    instrumenter: Arc<dyn Instrumenter>,
    token_counter: Option<Arc<dyn TokenCounter>>,
    config: RunnerConfig,
    event_sinks: Vec<RunEventSink>,
    observer_error_sink: Option<ObserverErrorSink>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("token_counter", &self.token_counter.is_some())
            .field("event_sinks", &self.event_sinks.len())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Runner with inline execution, an allow-all policy, and no instrumentation.
    pub fn new(provider: Arc<dyn Provider>, registry: Arc<dyn ToolsRegistry>) -> Self {
        Self {
            provider,
            registry,
            policy: Arc::new(AllowAll),
            executor: Arc::new(InlineExecutor),
            instrumenter: Arc::new(NoopInstrumenter),
            token_counter: None,
            config: RunnerConfig::default(),
            event_sinks: Vec::new(),
            observer_error_sink: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Switch to a [`PooledExecutor`] sized by the current config's
    /// `parallel_width`. Call after [`Runner::with_config`].
    pub fn with_pooled_executor(mut self) -> Self {
        self.executor = Arc::new(PooledExecutor::from_config(&self.config));
        self
    }

    pub fn with_instrumenter(mut self, instrumenter: Arc<dyn Instrumenter>) -> Self {
        self.instrumenter = instrumenter;
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = Some(counter);
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sinks.push(sink);
        self
    }

    pub fn with_observer_error_sink(mut self, sink: ObserverErrorSink) -> Self {
        self.observer_error_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start a run using synchronous provider calls.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, TurnstileError> {
        self.config.validate()?;
        engine::run_loop(self, Entry::fresh(self, request), TurnDriver::Sync).await
    }

    /// Start a run using streaming provider calls.
    pub async fn run_streaming(
        &self,
        request: RunRequest,
        on_event: &mut StreamCallback<'_>,
    ) -> Result<RunOutcome, TurnstileError> {
        self.config.validate()?;
        engine::run_loop(self, Entry::fresh(self, request), TurnDriver::Streaming(on_event)).await
    }

    /// Resume a run paused for confirmation.
    ///
    /// Every call the policy marked `confirm` needs a decision. Calls the
    /// policy allowed may be overridden and otherwise stay allowed.
    pub async fn resume<I>(
        &self,
        continuation: &Continuation,
        decisions: I,
    ) -> Result<RunOutcome, TurnstileError>
    where
        I: IntoIterator<Item = (String, ConfirmationDecision)>,
    {
        let entry = self.confirmation_entry(continuation, decisions)?;
        engine::run_loop(self, entry, TurnDriver::Sync).await
    }

    pub async fn resume_streaming<I>(
        &self,
        continuation: &Continuation,
        decisions: I,
        on_event: &mut StreamCallback<'_>,
    ) -> Result<RunOutcome, TurnstileError>
    where
        I: IntoIterator<Item = (String, ConfirmationDecision)>,
    {
        let entry = self.confirmation_entry(continuation, decisions)?;
        engine::run_loop(self, entry, TurnDriver::Streaming(on_event)).await
    }

    /// Resume a run paused on external tool results.
    pub async fn resume_with_tool_results<I>(
        &self,
        continuation: &Continuation,
        results: I,
        options: ResumeOptions,
    ) -> Result<RunOutcome, TurnstileError>
    where
        I: IntoIterator<Item = (String, ToolResult)>,
    {
        let entry = self.tool_results_entry(continuation, results, options)?;
        engine::run_loop(self, entry, TurnDriver::Sync).await
    }

    pub async fn resume_with_tool_results_streaming<I>(
        &self,
        continuation: &Continuation,
        results: I,
        options: ResumeOptions,
        on_event: &mut StreamCallback<'_>,
    ) -> Result<RunOutcome, TurnstileError>
    where
        I: IntoIterator<Item = (String, ToolResult)>,
    {
        let entry = self.tool_results_entry(continuation, results, options)?;
        engine::run_loop(self, entry, TurnDriver::Streaming(on_event)).await
    }

    fn confirmation_entry<I>(
        &self,
        continuation: &Continuation,
        decisions: I,
    ) -> Result<Entry, TurnstileError>
    where
        I: IntoIterator<Item = (String, ConfirmationDecision)>,
    {
        self.config.validate()?;
        engine::check_resumable(continuation)?;
        let decisions = resume::validate_confirmations(continuation, decisions)?;
        Ok(Entry::after_confirmation(self, continuation, decisions))
    }

    fn tool_results_entry<I>(
        &self,
        continuation: &Continuation,
        results: I,
        options: ResumeOptions,
    ) -> Result<Entry, TurnstileError>
    where
        I: IntoIterator<Item = (String, ToolResult)>,
    {
        self.config.validate()?;
        engine::check_resumable(continuation)?;
        let accepted = resume::validate_tool_results(continuation, results, options)?;
        Ok(Entry::after_tool_results(self, continuation, accepted))
    }
}
