use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::agent_loop::{
    ConfirmationDecision, Continuation, DecisionOutcome, DeferredExecutor, DenyAll, ExecutionStatus,
    FnPolicy, IgnoreReason, ObserverError, ObserverErrorSink, PauseReason, ResumeOptions,
    RulePolicy, RunEvent, RunEventPayload, RunOutcome, RunRequest, RunResult,
};
use crate::config::{ContextBudget, RunnerConfig, DEFAULT_FIXUP_PROMPT};
use crate::error::{ResumeError, TurnstileError};
use crate::provider::EstimatingTokenCounter;
use crate::types::{Message, Role, StopReason, StreamEvent, ToolResult, Usage};

mod support;

use support::{capture_events, lookup_and_delete, request_count, test_runner, ProviderScenario};

mod confirmation;
mod streaming;

fn user(text: &str) -> RunRequest {
    RunRequest::new("stub-model", vec![Message::user(text)])
}

fn completed(outcome: RunOutcome) -> RunResult {
    match outcome {
        RunOutcome::Completed(result) => result,
        RunOutcome::Paused(continuation) => {
            panic!("expected completion, paused on {}", continuation.pause_reason)
        }
    }
}

fn paused(outcome: RunOutcome) -> Continuation {
    match outcome {
        RunOutcome::Paused(continuation) => *continuation,
        RunOutcome::Completed(result) => {
            panic!("expected a pause, completed with {}", result.stop_reason)
        }
    }
}

fn tool_result_messages(messages: &[Message]) -> Vec<&Message> {
    messages
        .iter()
        .filter(|message| message.role == Role::ToolResult)
        .collect()
}
