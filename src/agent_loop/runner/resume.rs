//! Validation of resume input. Nothing here touches run state.

use std::collections::{BTreeMap, BTreeSet};

use super::super::approvals::{ConfirmationDecision, DecisionOutcome};
use super::super::continuation::Continuation;
use super::super::types::PauseReason;
use super::ResumeOptions;
use crate::error::ResumeError;
use crate::tools::limit_tool_result;
use crate::types::ToolResult;

fn expect_pause(continuation: &Continuation, expected: PauseReason) -> Result<(), ResumeError> {
    if continuation.pause_reason == expected {
        return Ok(());
    }
    Err(ResumeError::PauseReasonMismatch {
        expected: expected.to_string(),
        actual: continuation.pause_reason.to_string(),
    })
}

/// Check confirmation decisions against the paused turn.
pub(super) fn validate_confirmations<I>(
    continuation: &Continuation,
    decisions: I,
) -> Result<BTreeMap<String, ConfirmationDecision>, ResumeError>
where
    I: IntoIterator<Item = (String, ConfirmationDecision)>,
{
    expect_pause(continuation, PauseReason::AwaitingToolConfirmation)?;

    let pending: BTreeSet<&str> = continuation
        .pending_tool_calls
        .iter()
        .map(|call| call.tool_call_id.as_str())
        .collect();
    let mut accepted = BTreeMap::new();
    let mut unexpected = Vec::new();
    for (id, decision) in decisions {
        if accepted.contains_key(&id) {
            return Err(ResumeError::DuplicateConfirmation(id));
        }
        if !pending.contains(id.as_str()) {
            unexpected.push(id.clone());
        }
        accepted.insert(id, decision);
    }
    if !unexpected.is_empty() {
        unexpected.sort();
        return Err(ResumeError::UnexpectedConfirmations(unexpected));
    }

    let missing: Vec<String> = continuation
        .pending_tool_calls
        .iter()
        .filter(|call| {
            continuation
                .pending_decisions
                .get(&call.tool_call_id)
                .is_some_and(|decision| decision.outcome() == DecisionOutcome::Confirm)
        })
        .filter(|call| !accepted.contains_key(&call.tool_call_id))
        .map(|call| call.tool_call_id.clone())
        .collect();
    if !missing.is_empty() {
        return Err(ResumeError::MissingConfirmations(missing));
    }
    Ok(accepted)
}

/// Externally produced results that passed validation, already limited.
#[derive(Debug, Default)]
pub(super) struct AcceptedResults {
    /// Newly supplied results for pending calls.
    pub(super) fresh: BTreeMap<String, ToolResult>,
    /// Pending ids still without a result (only with `allow_partial`).
    pub(super) remaining: Vec<String>,
}

/// Check external tool results against the pending executions.
///
/// A result identical to one already buffered is accepted and ignored; a
/// different one conflicts.
pub(super) fn validate_tool_results<I>(
    continuation: &Continuation,
    results: I,
    options: ResumeOptions,
) -> Result<AcceptedResults, ResumeError>
where
    I: IntoIterator<Item = (String, ToolResult)>,
{
    expect_pause(continuation, PauseReason::AwaitingToolResults)?;

    let pending: BTreeSet<&str> = continuation
        .pending_tool_executions
        .iter()
        .map(|execution| execution.tool_call_id.as_str())
        .collect();
    let mut seen = BTreeSet::new();
    let mut fresh = BTreeMap::new();
    let mut unexpected = Vec::new();
    for (id, result) in results {
        if !seen.insert(id.clone()) {
            return Err(ResumeError::DuplicateToolResult(id));
        }
        let result = limit_tool_result(result, continuation.max_tool_output_bytes);
        if let Some(buffered) = continuation.buffered_tool_results.get(&id) {
            if *buffered != result {
                return Err(ResumeError::ConflictingToolResult(id));
            }
            continue;
        }
        if !pending.contains(id.as_str()) {
            unexpected.push(id);
            continue;
        }
        fresh.insert(id, result);
    }
    if !unexpected.is_empty() {
        unexpected.sort();
        return Err(ResumeError::UnexpectedToolResults(unexpected));
    }

    let remaining: Vec<String> = continuation
        .pending_tool_executions
        .iter()
        .filter(|execution| !fresh.contains_key(&execution.tool_call_id))
        .map(|execution| execution.tool_call_id.clone())
        .collect();
    if !remaining.is_empty() && !options.allow_partial {
        return Err(ResumeError::MissingToolResults(remaining));
    }
    Ok(AcceptedResults { fresh, remaining })
}
