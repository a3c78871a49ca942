use std::collections::BTreeMap;
use std::convert::Infallible;

use super::super::super::approvals::{Decision, DecisionOutcome, PendingToolConfirmation};
use super::super::super::continuation::ToolCallRef;
use super::super::super::events::RunEventPayload;
use super::super::super::executor::{ExecutionEnv, ExecutorOutcome};
use super::super::super::trace::{AuthorizationTrace, ExecutionStatus, ExecutionTrace};
use super::super::control::RunEventEmitter;
use super::super::limits::oversized_arguments;
use super::super::tooling::{
    append_tool_results, denied_tool_result, execution_request, invalid_arguments_result, ToolBatch,
};
use super::super::Runner;
use super::{LoopState, PauseState};
use crate::error::TurnstileError;
use crate::instrument::{instrument, AUTHORIZE_SPAN};
use crate::tools::summarize_tool_arguments;
use crate::types::ToolCall;

pub(super) enum Authorization {
    /// At least one call needs a human decision.
    NeedsConfirmation(PauseState),
    Ready(ToolBatch),
}

struct Authorized {
    call: ToolCall,
    executed_name: String,
    arguments_summary: String,
    decision: Decision,
}

/// Ask the policy about every call of the turn.
///
/// Calls with unparseable or oversized arguments are denied without
/// consulting the policy.
pub(super) async fn authorize_calls(
    runner: &Runner,
    state: &mut LoopState,
    turn: u32,
    calls: &[ToolCall],
    emitter: &RunEventEmitter,
) -> Result<Authorization, TurnstileError> {
    let order: Vec<ToolCallRef> = calls
        .iter()
        .map(|call| ToolCallRef {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
        })
        .collect();
    let mut denied = BTreeMap::new();
    let mut authorized = Vec::with_capacity(calls.len());

    for call in calls {
        let arguments_summary = summarize_tool_arguments(&call.arguments, runner.config.summary_mode);
        let executed_name = runner
            .registry
            .resolve(&call.name)
            .unwrap_or_else(|| call.name.clone());
        let invalid = call.parse_error.clone().or_else(|| {
            oversized_arguments(&call.arguments, runner.config.max_tool_argument_bytes)
        });

        let decision = match invalid {
            Some(parse_error) => {
                tracing::warn!(
                    run_id = %state.run_id,
                    turn,
                    tool_call_id = %call.id,
                    tool = %call.name,
                    error = %parse_error,
                    "rejecting tool call with invalid arguments"
                );
                denied.insert(
                    call.id.clone(),
                    invalid_arguments_result(&parse_error, state.max_tool_output_bytes),
                );
                Decision::deny(format!("invalid tool arguments: {parse_error}"))
            }
            None => {
                let ctx = state.context.for_call(turn, &call.id, &call.name);
                let payload = serde_json::json!({
                    "turn": turn,
                    "tool_call_id": call.id,
                    "name": call.name,
                    "executed_name": executed_name,
                    "arguments_summary": arguments_summary,
                });
                let decision = instrument(runner.instrumenter.as_ref(), AUTHORIZE_SPAN, payload, async {
                    Ok::<_, Infallible>(runner.policy.authorize(&executed_name, &call.arguments, &ctx).await)
                })
                .await
                .unwrap_or_else(|never| match never {});
                if let Decision::Deny { reason } = &decision {
                    denied.insert(
                        call.id.clone(),
                        denied_tool_result(reason, state.max_tool_output_bytes),
                    );
                }
                decision
            }
        };

        tracing::debug!(
            run_id = %state.run_id,
            turn,
            tool_call_id = %call.id,
            tool = %call.name,
            outcome = %decision.outcome(),
            "tool call authorized"
        );
        let reason = decision.reason().map(str::to_string);
        if let Some(trace) = state.trace_mut(turn) {
            trace.authorizations.push(AuthorizationTrace {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                outcome: decision.outcome(),
                reason: reason.clone(),
                arguments_summary: arguments_summary.clone(),
            });
        }
        emitter.emit(RunEventPayload::ToolAuthorized {
            turn,
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            outcome: decision.outcome(),
            reason,
        });
        authorized.push(Authorized {
            call: call.clone(),
            executed_name,
            arguments_summary,
            decision,
        });
    }

    let needs_confirmation = authorized
        .iter()
        .any(|entry| entry.decision.outcome() == DecisionOutcome::Confirm);
    if needs_confirmation {
        let mut pending_calls = Vec::new();
        let mut pending_decisions = BTreeMap::new();
        for entry in authorized {
            if entry.decision.outcome() == DecisionOutcome::Deny {
                continue;
            }
            pending_calls.push(PendingToolConfirmation {
                tool_call_id: entry.call.id.clone(),
                name: entry.call.name,
                executed_name: entry.executed_name,
                arguments: entry.call.arguments,
                reason: entry.decision.reason().map(str::to_string),
                arguments_summary: entry.arguments_summary,
            });
            pending_decisions.insert(entry.call.id, entry.decision);
        }
        return Ok(Authorization::NeedsConfirmation(PauseState::confirmation(
            order,
            pending_calls,
            pending_decisions,
            denied,
        )));
    }

    let to_execute = authorized
        .iter()
        .filter(|entry| entry.decision.outcome() == DecisionOutcome::Allow)
        .map(|entry| {
            execution_request(
                runner.registry.as_ref(),
                &entry.call.id,
                &entry.call.name,
                &entry.executed_name,
                &entry.call.arguments,
                &entry.arguments_summary,
            )
        })
        .collect();
    Ok(Authorization::Ready(ToolBatch {
        turn,
        order,
        results: denied,
        to_execute,
    }))
}

/// Execute a batch and append its tool-result messages.
///
/// Returns a pause when the executor defers the calls.
pub(super) async fn run_tool_batch(
    runner: &Runner,
    state: &mut LoopState,
    batch: ToolBatch,
    emitter: &RunEventEmitter,
) -> Result<Option<PauseState>, TurnstileError> {
    let ToolBatch {
        turn,
        order,
        mut results,
        to_execute,
    } = batch;

    if !to_execute.is_empty() {
        let env = ExecutionEnv {
            registry: runner.registry.as_ref(),
            instrumenter: runner.instrumenter.as_ref(),
            context: &state.context,
            turn,
            max_tool_output_bytes: state.max_tool_output_bytes,
            summary_mode: runner.config.summary_mode,
        };
        match runner.executor.execute(to_execute, &env).await? {
            ExecutorOutcome::Completed(done) => {
                for execution in done {
                    let status = if execution.succeeded {
                        ExecutionStatus::Succeeded
                    } else {
                        ExecutionStatus::Failed
                    };
                    if let Some(trace) = state.trace_mut(turn) {
                        trace.executions.push(ExecutionTrace {
                            tool_call_id: execution.tool_call_id.clone(),
                            name: execution.name.clone(),
                            executed_name: execution.executed_name.clone(),
                            status,
                            duration_ms: execution.duration_ms,
                            result_summary: Some(execution.result_summary.clone()),
                        });
                    }
                    emitter.emit(RunEventPayload::ToolExecuted {
                        turn,
                        tool_call_id: execution.tool_call_id.clone(),
                        name: execution.name,
                        succeeded: execution.succeeded,
                        duration_ms: execution.duration_ms,
                        result_summary: execution.result_summary,
                    });
                    results.insert(execution.tool_call_id, execution.result);
                }
            }
            ExecutorOutcome::Deferred(pending) => {
                for execution in &pending {
                    if let Some(trace) = state.trace_mut(turn) {
                        trace.executions.push(ExecutionTrace {
                            tool_call_id: execution.tool_call_id.clone(),
                            name: execution.name.clone(),
                            executed_name: execution.executed_name.clone(),
                            status: ExecutionStatus::Deferred,
                            duration_ms: 0,
                            result_summary: None,
                        });
                    }
                    emitter.emit(RunEventPayload::ToolDeferred {
                        turn,
                        tool_call_id: execution.tool_call_id.clone(),
                        name: execution.name.clone(),
                    });
                }
                return Ok(Some(PauseState::tool_results(order, pending, results)));
            }
        }
    }

    append_tool_results(&mut state.messages, &order, &results)?;
    Ok(None)
}
