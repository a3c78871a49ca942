use std::collections::BTreeMap;

use super::super::continuation::ToolCallRef;
use super::super::executor::ExecutionRequest;
use crate::error::TurnstileError;
use crate::tools::{limit_tool_result, ToolsRegistry, LOCAL_SOURCE};
use crate::types::{Message, ToolResult};

/// The tool phase of one turn: known results plus calls still to run.
#[derive(Debug, Clone)]
pub(super) struct ToolBatch {
    pub(super) turn: u32,
    pub(super) order: Vec<ToolCallRef>,
    pub(super) results: BTreeMap<String, ToolResult>,
    pub(super) to_execute: Vec<ExecutionRequest>,
}

pub(super) fn denied_tool_result(reason: &str, max_bytes: usize) -> ToolResult {
    limit_tool_result(
        ToolResult::error(format!("Tool call denied: {reason}")),
        max_bytes,
    )
}

pub(super) fn invalid_arguments_result(parse_error: &str, max_bytes: usize) -> ToolResult {
    let result = ToolResult::error(format!(
        "Tool call denied: invalid tool arguments: {parse_error}"
    ))
    .with_metadata("parse_error", serde_json::Value::String(parse_error.to_string()));
    limit_tool_result(result, max_bytes)
}

pub(super) fn execution_request(
    registry: &dyn ToolsRegistry,
    tool_call_id: &str,
    name: &str,
    executed_name: &str,
    arguments: &serde_json::Value,
    arguments_summary: &str,
) -> ExecutionRequest {
    let source = registry
        .find(executed_name)
        .map(|meta| meta.source)
        .unwrap_or_else(|| LOCAL_SOURCE.to_string());
    ExecutionRequest {
        tool_call_id: tool_call_id.to_string(),
        name: name.to_string(),
        executed_name: executed_name.to_string(),
        arguments: arguments.clone(),
        arguments_summary: arguments_summary.to_string(),
        source,
    }
}

/// Append one tool-result message per call, in call order.
pub(super) fn append_tool_results(
    messages: &mut Vec<Message>,
    order: &[ToolCallRef],
    results: &BTreeMap<String, ToolResult>,
) -> Result<(), TurnstileError> {
    let missing: Vec<&str> = order
        .iter()
        .filter(|call| !results.contains_key(&call.tool_call_id))
        .map(|call| call.tool_call_id.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(TurnstileError::InvalidState(format!(
            "no tool result for tool calls: {}",
            missing.join(", ")
        )));
    }
    for call in order {
        if let Some(result) = results.get(&call.tool_call_id) {
            messages.push(Message::tool_result(&call.tool_call_id, &call.name, result));
        }
    }
    Ok(())
}
