//! Tool execution strategies.
//!
//! An executor receives the authorized calls of one turn and either runs all
//! of them or defers all of them. Every completed result passes through
//! [`limit_tool_result`], and a failing or panicking tool becomes an error
//! result instead of aborting the batch.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures::{stream, FutureExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::{RunnerConfig, DEFAULT_PARALLEL_WIDTH};
use crate::error::TurnstileError;
use crate::instrument::{self, panic_message, Instrumenter, TOOL_EXECUTION_SPAN};
use crate::tools::{
    limit_tool_result, summarize_tool_result, SummaryMode, ToolContext, ToolsRegistry,
};
use crate::types::ToolResult;

/// One authorized call handed to an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub tool_call_id: String,
    /// Name requested by the model.
    pub name: String,
    /// Registry name after alias resolution.
    pub executed_name: String,
    pub arguments: serde_json::Value,
    pub arguments_summary: String,
    pub source: String,
}

/// Shared inputs for one executor call.
pub struct ExecutionEnv<'a> {
    pub registry: &'a dyn ToolsRegistry,
    pub instrumenter: &'a dyn Instrumenter,
    /// Run-level context; narrowed per call.
    pub context: &'a ToolContext,
    pub turn: u32,
    pub max_tool_output_bytes: usize,
    pub summary_mode: SummaryMode,
}

/// A finished call, paired with its request by `tool_call_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedExecution {
    pub tool_call_id: String,
    pub name: String,
    pub executed_name: String,
    pub result: ToolResult,
    pub succeeded: bool,
    pub duration_ms: u64,
    pub result_summary: String,
}

/// A call whose result will come from outside this process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingToolExecution {
    pub tool_call_id: String,
    pub name: String,
    pub executed_name: String,
    pub arguments: serde_json::Value,
    pub arguments_summary: String,
    pub source: String,
}

impl From<ExecutionRequest> for PendingToolExecution {
    fn from(request: ExecutionRequest) -> Self {
        Self {
            tool_call_id: request.tool_call_id,
            name: request.name,
            executed_name: request.executed_name,
            arguments: request.arguments,
            arguments_summary: request.arguments_summary,
            source: request.source,
        }
    }
}

/// Either every request ran, or every request was deferred.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorOutcome {
    Completed(Vec<CompletedExecution>),
    Deferred(Vec<PendingToolExecution>),
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        requests: Vec<ExecutionRequest>,
        env: &ExecutionEnv<'_>,
    ) -> Result<ExecutorOutcome, TurnstileError>;
}

/// Runs calls one at a time, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

#[async_trait]
impl ToolExecutor for InlineExecutor {
    async fn execute(
        &self,
        requests: Vec<ExecutionRequest>,
        env: &ExecutionEnv<'_>,
    ) -> Result<ExecutorOutcome, TurnstileError> {
        let mut completed = Vec::with_capacity(requests.len());
        for request in requests {
            completed.push(execute_request(request, env).await);
        }
        Ok(ExecutorOutcome::Completed(completed))
    }
}

/// Runs parallelizable tools on a bounded pool.
///
/// Tools the registry does not mark parallelizable run first, sequentially.
/// Results come back in request order.
#[derive(Debug, Clone, Copy)]
pub struct PooledExecutor {
    width: usize,
}

impl PooledExecutor {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    /// Pool sized by `parallel_width`.
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.parallel_width)
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl Default for PooledExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLEL_WIDTH)
    }
}

#[async_trait]
impl ToolExecutor for PooledExecutor {
    async fn execute(
        &self,
        requests: Vec<ExecutionRequest>,
        env: &ExecutionEnv<'_>,
    ) -> Result<ExecutorOutcome, TurnstileError> {
        let total = requests.len();
        let (parallel, sequential): (Vec<_>, Vec<_>) =
            requests.into_iter().enumerate().partition(|(_, request)| {
                env.registry
                    .find(&request.executed_name)
                    .is_some_and(|meta| meta.parallelizable)
            });

        let mut slots: Vec<Option<CompletedExecution>> = (0..total).map(|_| None).collect();
        for (index, request) in sequential {
            slots[index] = Some(execute_request(request, env).await);
        }

        let finished: Vec<(usize, CompletedExecution)> = stream::iter(parallel)
            .map(|(index, request)| async move { (index, execute_request(request, env).await) })
            .buffer_unordered(self.width)
            .collect()
            .await;
        for (index, execution) in finished {
            slots[index] = Some(execution);
        }

        Ok(ExecutorOutcome::Completed(slots.into_iter().flatten().collect()))
    }
}

/// Executes nothing; every call becomes a pending execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredExecutor;

#[async_trait]
impl ToolExecutor for DeferredExecutor {
    async fn execute(
        &self,
        requests: Vec<ExecutionRequest>,
        _env: &ExecutionEnv<'_>,
    ) -> Result<ExecutorOutcome, TurnstileError> {
        Ok(ExecutorOutcome::Deferred(
            requests.into_iter().map(PendingToolExecution::from).collect(),
        ))
    }
}

/// Run one request through the registry with panic isolation and limiting.
pub async fn execute_request(request: ExecutionRequest, env: &ExecutionEnv<'_>) -> CompletedExecution {
    let ctx = env
        .context
        .for_call(env.turn, &request.tool_call_id, &request.name);
    let payload = serde_json::json!({
        "turn": env.turn,
        "tool_call_id": request.tool_call_id,
        "name": request.name,
        "executed_name": request.executed_name,
        "source": request.source,
    });
    let started = Instant::now();

    let work = async {
        let call = env
            .registry
            .execute(&request.executed_name, &request.arguments, &ctx);
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(TurnstileError::ToolNotFound(name))) => {
                ToolResult::error(format!("Tool not found: {name}"))
            }
            Ok(Err(err)) => ToolResult::error(format!("Tool execution failed: {err}")),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(
                    tool = %request.executed_name,
                    tool_call_id = %request.tool_call_id,
                    error = %message,
                    "tool panicked"
                );
                ToolResult::error(format!("Tool panicked: {message}"))
            }
        };
        let result = limit_tool_result(result, env.max_tool_output_bytes);
        if result.is_error {
            Err(result)
        } else {
            Ok(result)
        }
    };
    let outcome = instrument::instrument(env.instrumenter, TOOL_EXECUTION_SPAN, payload, work).await;
    let succeeded = outcome.is_ok();
    let result = outcome.unwrap_or_else(|failed| failed);

    CompletedExecution {
        result_summary: summarize_tool_result(&result, env.summary_mode),
        tool_call_id: request.tool_call_id,
        name: request.name,
        executed_name: request.executed_name,
        result,
        succeeded,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
