use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::super::approvals::{ConfirmationDecision, Decision, PendingToolConfirmation};
use super::super::continuation::{Continuation, ToolCallRef};
use super::super::events::RunEventPayload;
use super::super::executor::PendingToolExecution;
use super::super::trace::{ConfirmationTrace, ExecutionStatus, ExecutionTrace, TurnTrace};
use super::super::types::{PauseReason, RunId, RunOutcome, RunResult, RunTrace};
use super::control::RunEventEmitter;
use super::limits::{effective_call_limit, shape_tool_calls};
use super::resume::AcceptedResults;
use super::tooling::{denied_tool_result, execution_request, ToolBatch};
use super::{RunRequest, Runner};
use crate::config::{validate_calls_per_turn, validate_output_budget, EmptyFinalFixup};
use crate::error::TurnstileError;
use crate::instrument::{RUN_COMPLETED_EVENT, RUN_PAUSED_EVENT, TOOL_CALLS_IGNORED_EVENT};
use crate::provider::{ProviderRequest, RequestOptions, ToolDefinition};
use crate::tools::{summarize_tool_result, ToolContext};
use crate::types::timestamp;
use crate::types::{Message, Role, StopReason, ToolResult, Usage};

mod llm_phase;
mod tool_phase;

pub(super) use llm_phase::TurnDriver;
use llm_phase::{call_llm, preflight};
use tool_phase::{authorize_calls, run_tool_batch, Authorization};

/// Mutable state owned by one run/resume call.
pub(super) struct LoopState {
    run_id: RunId,
    started_at: DateTime<Utc>,
    prior_duration_ms: u64,
    clock: Instant,
    resumed: bool,
    turn: u32,
    max_turns: u32,
    model: String,
    options: RequestOptions,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    tools_enabled: bool,
    fixup_attempted: bool,
    any_tool_calls_seen: bool,
    usage: Usage,
    turn_usage: Vec<Usage>,
    turn_traces: Vec<TurnTrace>,
    max_tool_output_bytes: usize,
    max_tool_calls_per_turn: usize,
    fixup: EmptyFinalFixup,
    context: ToolContext,
    context_attributes: BTreeMap<String, serde_json::Value>,
}

impl LoopState {
    fn from_continuation(continuation: &Continuation) -> Self {
        Self {
            run_id: continuation.run_id,
            started_at: continuation.started_at,
            prior_duration_ms: continuation.duration_ms,
            clock: Instant::now(),
            resumed: true,
            turn: continuation.turn,
            max_turns: continuation.max_turns,
            model: continuation.model.clone(),
            options: continuation.options.clone(),
            messages: continuation.messages.clone(),
            tools: continuation.tools.clone(),
            tools_enabled: continuation.tools_enabled,
            fixup_attempted: continuation.empty_final_fixup_attempted,
            any_tool_calls_seen: continuation.any_tool_calls_seen,
            usage: continuation.usage,
            turn_usage: continuation.turn_usage.clone(),
            turn_traces: continuation.turn_traces.clone(),
            max_tool_output_bytes: continuation.max_tool_output_bytes,
            max_tool_calls_per_turn: continuation.max_tool_calls_per_turn,
            fixup: continuation.empty_final_fixup.clone(),
            context: ToolContext::for_run(
                continuation.run_id,
                continuation.context_attributes.clone(),
            ),
            context_attributes: continuation.context_attributes.clone(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.prior_duration_ms + self.clock.elapsed().as_millis() as u64
    }

    fn trace_mut(&mut self, turn: u32) -> Option<&mut TurnTrace> {
        self.turn_traces.iter_mut().rev().find(|trace| trace.turn == turn)
    }

    fn provider_request(&self, offer_tools: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
            tools: offer_tools.then(|| self.tools.clone()),
            options: self.options.clone(),
        }
    }

    fn final_message(&self) -> Message {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .cloned()
            .unwrap_or_else(|| Message::assistant(""))
    }
}

/// Why and on what a run pauses.
pub(super) struct PauseState {
    reason: PauseReason,
    order: Vec<ToolCallRef>,
    pending_calls: Vec<PendingToolConfirmation>,
    pending_decisions: BTreeMap<String, Decision>,
    pending_executions: Vec<PendingToolExecution>,
    buffered: BTreeMap<String, ToolResult>,
}

impl PauseState {
    fn confirmation(
        order: Vec<ToolCallRef>,
        pending_calls: Vec<PendingToolConfirmation>,
        pending_decisions: BTreeMap<String, Decision>,
        buffered: BTreeMap<String, ToolResult>,
    ) -> Self {
        Self {
            reason: PauseReason::AwaitingToolConfirmation,
            order,
            pending_calls,
            pending_decisions,
            pending_executions: Vec::new(),
            buffered,
        }
    }

    fn tool_results(
        order: Vec<ToolCallRef>,
        pending_executions: Vec<PendingToolExecution>,
        buffered: BTreeMap<String, ToolResult>,
    ) -> Self {
        Self {
            reason: PauseReason::AwaitingToolResults,
            order,
            pending_calls: Vec::new(),
            pending_decisions: BTreeMap::new(),
            pending_executions,
            buffered,
        }
    }

    fn pending_count(&self) -> usize {
        self.pending_calls.len() + self.pending_executions.len()
    }
}

enum Start {
    Fresh,
    ToolPhase(ToolBatch),
    Pause(PauseState),
}

/// Loop state plus the first step to take.
pub(super) struct Entry {
    state: LoopState,
    start: Start,
}

impl Entry {
    pub(super) fn fresh(runner: &Runner, request: RunRequest) -> Self {
        let config = &runner.config;
        let tools = request
            .tools
            .unwrap_or_else(|| runner.registry.definitions());
        let state = LoopState {
            run_id: request.run_id,
            started_at: timestamp::now(),
            prior_duration_ms: 0,
            clock: Instant::now(),
            resumed: false,
            turn: 0,
            max_turns: config.max_turns,
            model: request.model,
            options: request.options,
            messages: request.messages,
            tools,
            tools_enabled: true,
            fixup_attempted: false,
            any_tool_calls_seen: false,
            usage: Usage::default(),
            turn_usage: Vec::new(),
            turn_traces: Vec::new(),
            max_tool_output_bytes: config.max_tool_output_bytes,
            max_tool_calls_per_turn: config.max_tool_calls_per_turn,
            fixup: config.empty_final_fixup.clone(),
            context: ToolContext::for_run(request.run_id, request.context_attributes.clone()),
            context_attributes: request.context_attributes,
        };
        Self {
            state,
            start: Start::Fresh,
        }
    }

    /// Apply validated confirmation decisions to the paused turn.
    pub(super) fn after_confirmation(
        runner: &Runner,
        continuation: &Continuation,
        decisions: BTreeMap<String, ConfirmationDecision>,
    ) -> Self {
        let mut state = LoopState::from_continuation(continuation);
        let turn = continuation.turn;
        let mut results = continuation.buffered_tool_results.clone();
        let mut to_execute = Vec::new();
        let mut confirmations = Vec::new();

        for pending in &continuation.pending_tool_calls {
            let supplied = decisions.get(&pending.tool_call_id);
            let decision = supplied.cloned().unwrap_or(ConfirmationDecision::Allow);
            match &decision {
                ConfirmationDecision::Allow => to_execute.push(execution_request(
                    runner.registry.as_ref(),
                    &pending.tool_call_id,
                    &pending.name,
                    &pending.executed_name,
                    &pending.arguments,
                    &pending.arguments_summary,
                )),
                ConfirmationDecision::Deny { reason } => {
                    let reason = reason.as_deref().unwrap_or("denied by user");
                    results.insert(
                        pending.tool_call_id.clone(),
                        denied_tool_result(reason, state.max_tool_output_bytes),
                    );
                }
            }
            if supplied.is_some() {
                confirmations.push(ConfirmationTrace {
                    tool_call_id: pending.tool_call_id.clone(),
                    name: pending.name.clone(),
                    allowed: decision.is_allowed(),
                    reason: match decision {
                        ConfirmationDecision::Deny { reason } => reason,
                        ConfirmationDecision::Allow => None,
                    },
                });
            }
        }
        if let Some(trace) = state.trace_mut(turn) {
            trace.confirmations.extend(confirmations);
        }

        let batch = ToolBatch {
            turn,
            order: continuation.tool_call_order.clone(),
            results,
            to_execute,
        };
        Self {
            state,
            start: Start::ToolPhase(batch),
        }
    }

    /// Buffer validated external results; pause again if some are still missing.
    pub(super) fn after_tool_results(
        runner: &Runner,
        continuation: &Continuation,
        accepted: AcceptedResults,
    ) -> Self {
        let mut state = LoopState::from_continuation(continuation);
        let turn = continuation.turn;

        let executions: Vec<ExecutionTrace> = continuation
            .pending_tool_executions
            .iter()
            .filter_map(|pending| {
                let result = accepted.fresh.get(&pending.tool_call_id)?;
                Some(ExecutionTrace {
                    tool_call_id: pending.tool_call_id.clone(),
                    name: pending.name.clone(),
                    executed_name: pending.executed_name.clone(),
                    status: ExecutionStatus::External,
                    duration_ms: 0,
                    result_summary: Some(summarize_tool_result(
                        result,
                        runner.config.summary_mode,
                    )),
                })
            })
            .collect();
        if let Some(trace) = state.trace_mut(turn) {
            trace.executions.extend(executions);
        }
        tracing::debug!(
            run_id = %state.run_id,
            turn,
            received = accepted.fresh.len(),
            remaining = accepted.remaining.len(),
            "tool results accepted"
        );

        let mut results = continuation.buffered_tool_results.clone();
        results.extend(accepted.fresh);
        let order = continuation.tool_call_order.clone();

        let start = if accepted.remaining.is_empty() {
            Start::ToolPhase(ToolBatch {
                turn,
                order,
                results,
                to_execute: Vec::new(),
            })
        } else {
            let pending = continuation
                .pending_tool_executions
                .iter()
                .filter(|pending| accepted.remaining.contains(&pending.tool_call_id))
                .cloned()
                .collect();
            Start::Pause(PauseState::tool_results(order, pending, results))
        };
        Self { state, start }
    }
}

/// Structural checks a continuation must pass before any resume input is read.
pub(super) fn check_resumable(continuation: &Continuation) -> Result<(), TurnstileError> {
    continuation.validate()?;
    validate_output_budget(continuation.max_tool_output_bytes)?;
    validate_calls_per_turn(continuation.max_tool_calls_per_turn)?;
    Ok(())
}

/// The turn loop shared by every entry point.
pub(super) async fn run_loop(
    runner: &Runner,
    entry: Entry,
    mut driver: TurnDriver<'_, '_>,
) -> Result<RunOutcome, TurnstileError> {
    let Entry { mut state, start } = entry;
    let emitter = RunEventEmitter::new(
        state.run_id,
        runner.event_sinks.clone(),
        runner.observer_error_sink.clone(),
    );
    tracing::debug!(
        run_id = %state.run_id,
        model = %state.model,
        resumed = state.resumed,
        turn = state.turn,
        max_turns = state.max_turns,
        "turnstile run start"
    );
    emitter.emit(RunEventPayload::RunStarted {
        model: state.model.clone(),
        resumed: state.resumed,
    });

    match start {
        Start::Fresh => {}
        Start::ToolPhase(batch) => {
            if let Some(pause) = run_tool_batch(runner, &mut state, batch, &emitter).await? {
                return Ok(pause_run(runner, state, pause, &emitter));
            }
        }
        Start::Pause(pause) => return Ok(pause_run(runner, state, pause, &emitter)),
    }

    let mut fixup_turn = false;
    loop {
        if state.turn >= state.max_turns {
            tracing::debug!(run_id = %state.run_id, max_turns = state.max_turns, "turn budget exhausted");
            return Ok(finish_run(runner, state, StopReason::MaxTurns, &emitter));
        }
        state.turn += 1;
        let turn = state.turn;
        let turn_clock = Instant::now();
        let turn_started_at = timestamp::now();
        emitter.emit(RunEventPayload::TurnStarted { turn });

        let offer_tools = state.tools_enabled && !state.tools.is_empty();
        let request = state.provider_request(offer_tools);
        preflight(runner, &request, turn).await?;
        let reply = call_llm(runner, &request, &mut driver, turn, &emitter).await?;

        let turn_usage = reply.usage.unwrap_or_default();
        state.usage += turn_usage;
        state.turn_usage.push(turn_usage);

        let mut trace = TurnTrace::new(turn, turn_started_at, reply.stop_reason);
        trace.usage = reply.usage;
        trace.tools_offered = offer_tools;
        trace.fixup = fixup_turn;
        fixup_turn = false;

        let mut message = reply.message;
        message.role = Role::Assistant;
        let limit = effective_call_limit(&state.options, state.max_tool_calls_per_turn);
        let (calls, ignored) = shape_tool_calls(std::mem::take(&mut message.tool_calls), offer_tools, limit);
        if !ignored.is_empty() {
            tracing::warn!(
                run_id = %state.run_id,
                turn,
                ignored = ignored.len(),
                tools_offered = offer_tools,
                limit,
                "ignoring tool calls"
            );
            emitter.publish(
                runner.instrumenter.as_ref(),
                TOOL_CALLS_IGNORED_EVENT,
                serde_json::json!({
                    "run_id": state.run_id,
                    "turn": turn,
                    "calls": ignored,
                }),
            );
            emitter.emit(RunEventPayload::ToolCallsIgnored {
                turn,
                calls: ignored.clone(),
            });
            trace.ignored_tool_calls = ignored;
        }
        message.tool_calls = calls.clone();
        let blank = message.is_blank();
        state.messages.push(message);
        emitter.emit(RunEventPayload::LlmResponse {
            turn,
            stop_reason: reply.stop_reason,
            tool_calls: calls.len(),
            usage: reply.usage,
        });
        state.turn_traces.push(trace);

        if !calls.is_empty() {
            state.any_tool_calls_seen = true;
            let pause = match authorize_calls(runner, &mut state, turn, &calls, &emitter).await? {
                Authorization::NeedsConfirmation(pause) => Some(pause),
                Authorization::Ready(batch) => {
                    run_tool_batch(runner, &mut state, batch, &emitter).await?
                }
            };
            close_turn(&mut state, turn, turn_clock);
            if let Some(pause) = pause {
                return Ok(pause_run(runner, state, pause, &emitter));
            }
            continue;
        }
        close_turn(&mut state, turn, turn_clock);

        let wants_fixup = blank
            && offer_tools
            && state.any_tool_calls_seen
            && state.fixup.enabled
            && !state.fixup_attempted;
        if wants_fixup {
            tracing::debug!(run_id = %state.run_id, turn, "empty final answer; retrying once");
            state.messages.push(Message::user(state.fixup.prompt.clone()));
            state.fixup_attempted = true;
            if state.fixup.disable_tools {
                state.tools_enabled = false;
            }
            fixup_turn = true;
            continue;
        }

        // No calls remain for this turn, whether dropped or never sent, so the
        // run ends normally even if the provider reported `tool_use`.
        let stop_reason = match reply.stop_reason {
            StopReason::ToolUse => StopReason::EndTurn,
            other => other,
        };
        return Ok(finish_run(runner, state, stop_reason, &emitter));
    }
}

fn close_turn(state: &mut LoopState, turn: u32, clock: Instant) {
    if let Some(trace) = state.trace_mut(turn) {
        trace.duration_ms = clock.elapsed().as_millis() as u64;
    }
}

fn finish_run(
    runner: &Runner,
    state: LoopState,
    stop_reason: StopReason,
    emitter: &RunEventEmitter,
) -> RunOutcome {
    let duration_ms = state.elapsed_ms();
    let final_message = state.final_message();
    tracing::debug!(
        run_id = %state.run_id,
        turns = state.turn,
        stop_reason = %stop_reason,
        duration_ms,
        "turnstile run completed"
    );
    emitter.emit(RunEventPayload::RunCompleted {
        turns: state.turn,
        stop_reason,
    });
    emitter.publish(
        runner.instrumenter.as_ref(),
        RUN_COMPLETED_EVENT,
        serde_json::json!({
            "run_id": state.run_id,
            "turns": state.turn,
            "stop_reason": stop_reason,
            "usage": state.usage,
        }),
    );

    RunOutcome::Completed(RunResult {
        run_id: state.run_id,
        final_message,
        stop_reason,
        turns: state.turn,
        usage: state.usage,
        trace: RunTrace {
            run_id: state.run_id,
            started_at: state.started_at,
            duration_ms,
            turns: state.turn,
            stop_reason,
            usage: state.usage,
            turn_traces: state.turn_traces,
        },
        messages: state.messages,
    })
}

fn pause_run(
    runner: &Runner,
    state: LoopState,
    pause: PauseState,
    emitter: &RunEventEmitter,
) -> RunOutcome {
    let pending = pause.pending_count();
    tracing::debug!(
        run_id = %state.run_id,
        turn = state.turn,
        pause_reason = %pause.reason,
        pending,
        "turnstile run paused"
    );
    emitter.emit(RunEventPayload::RunPaused {
        turn: state.turn,
        pause_reason: pause.reason,
        pending,
    });
    emitter.publish(
        runner.instrumenter.as_ref(),
        RUN_PAUSED_EVENT,
        serde_json::json!({
            "run_id": state.run_id,
            "turn": state.turn,
            "pause_reason": pause.reason,
            "pending": pending,
        }),
    );

    let duration_ms = state.elapsed_ms();
    RunOutcome::Paused(Box::new(Continuation {
        run_id: state.run_id,
        started_at: state.started_at,
        duration_ms,
        turn: state.turn,
        max_turns: state.max_turns,
        model: state.model,
        options: state.options,
        messages: state.messages,
        tools: state.tools,
        tools_enabled: state.tools_enabled,
        empty_final_fixup_attempted: state.fixup_attempted,
        any_tool_calls_seen: state.any_tool_calls_seen,
        usage: state.usage,
        turn_usage: state.turn_usage,
        turn_traces: state.turn_traces,
        pause_reason: pause.reason,
        pending_tool_calls: pause.pending_calls,
        pending_decisions: pause.pending_decisions,
        pending_tool_executions: pause.pending_executions,
        buffered_tool_results: pause.buffered,
        tool_call_order: pause.order,
        max_tool_output_bytes: state.max_tool_output_bytes,
        max_tool_calls_per_turn: state.max_tool_calls_per_turn,
        empty_final_fixup: state.fixup,
        context_attributes: state.context_attributes,
    }))
}
