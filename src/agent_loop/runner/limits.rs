use std::collections::HashSet;

use super::super::trace::{IgnoreReason, IgnoredToolCall};
use crate::provider::RequestOptions;
use crate::types::ToolCall;

/// Calls honored in one turn: one when the request disabled parallel calls.
pub(super) fn effective_call_limit(options: &RequestOptions, max_tool_calls_per_turn: usize) -> usize {
    if options.parallel_tool_calls_disabled() {
        1
    } else {
        max_tool_calls_per_turn
    }
}

/// Split the model's calls into those the turn will handle and those it drops.
///
/// Only the first call with a given id is kept; results are keyed by id.
pub(super) fn shape_tool_calls(
    calls: Vec<ToolCall>,
    tools_offered: bool,
    limit: usize,
) -> (Vec<ToolCall>, Vec<IgnoredToolCall>) {
    let mut kept = Vec::new();
    let mut ignored = Vec::new();
    let mut seen = HashSet::new();
    for call in calls {
        let reason = if !tools_offered {
            Some(IgnoreReason::ToolsNotOffered)
        } else if !seen.insert(call.id.clone()) {
            Some(IgnoreReason::DuplicateId)
        } else if kept.len() >= limit {
            Some(IgnoreReason::OverTurnLimit)
        } else {
            None
        };
        match reason {
            Some(reason) => ignored.push(IgnoredToolCall {
                tool_call_id: call.id,
                name: call.name,
                reason,
            }),
            None => kept.push(call),
        }
    }
    (kept, ignored)
}

/// Reason to refuse structured arguments larger than `max_bytes`.
pub(super) fn oversized_arguments(arguments: &serde_json::Value, max_bytes: usize) -> Option<String> {
    let size = serde_json::to_vec(arguments).map(|bytes| bytes.len()).ok()?;
    (size > max_bytes).then(|| format!("arguments are {size} bytes, limit is {max_bytes} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calls(n: usize) -> Vec<ToolCall> {
        (0..n)
            .map(|i| ToolCall::new(format!("call_{i}"), "lookup", json!({})))
            .collect()
    }

    #[test]
    fn disabling_parallel_calls_limits_turns_to_one_call() {
        let options = RequestOptions::builder().parallel_tool_calls(false).build();
        assert_eq!(effective_call_limit(&options, 16), 1);
        assert_eq!(effective_call_limit(&RequestOptions::default(), 16), 16);
    }

    #[test]
    fn excess_calls_are_ignored_in_order() {
        let (kept, ignored) = shape_tool_calls(calls(4), true, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(
            ignored.iter().map(|c| c.tool_call_id.as_str()).collect::<Vec<_>>(),
            vec!["call_2", "call_3"]
        );
        assert!(ignored.iter().all(|c| c.reason == IgnoreReason::OverTurnLimit));
    }

    #[test]
    fn calls_are_stripped_when_tools_were_not_offered() {
        let (kept, ignored) = shape_tool_calls(calls(2), false, 16);
        assert!(kept.is_empty());
        assert!(ignored.iter().all(|c| c.reason == IgnoreReason::ToolsNotOffered));
    }

    #[test]
    fn repeated_ids_keep_the_first_call() {
        let mut calls = calls(3);
        calls[2].id = "call_0".into();
        calls[2].name = "delete".into();

        let (kept, ignored) = shape_tool_calls(calls, true, 16);

        assert_eq!(
            kept.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["call_0", "call_1"]
        );
        assert_eq!(kept[0].name, "lookup");
        assert_eq!(ignored.len(), 1);
        assert_eq!(ignored[0].name, "delete");
        assert_eq!(ignored[0].reason, IgnoreReason::DuplicateId);
    }

    #[test]
    fn oversized_arguments_are_reported() {
        assert!(oversized_arguments(&json!({"q": "x".repeat(100)}), 50).is_some());
        assert!(oversized_arguments(&json!({"q": "x"}), 50).is_none());
    }
}
