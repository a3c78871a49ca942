//! Frozen state of a paused run.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::approvals::{Decision, PendingToolConfirmation};
use super::executor::PendingToolExecution;
use super::trace::TurnTrace;
use super::types::{PauseReason, RunId};
use crate::config::EmptyFinalFixup;
use crate::error::CodecError;
use crate::provider::{RequestOptions, ToolDefinition};
use crate::types::timestamp;
use crate::types::{Message, ToolResult, Usage};

/// A tool call of the paused turn, in the order the model emitted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRef {
    pub tool_call_id: String,
    pub name: String,
}

/// Everything needed to resume a paused run, possibly in another process.
///
/// Exactly one of the pending sets is populated, matching `pause_reason`:
/// `pending_tool_calls` (with `pending_decisions`) while awaiting
/// confirmation, `pending_tool_executions` while awaiting results.
/// Resuming never mutates a continuation; a run that pauses again returns a
/// new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Continuation {
    pub run_id: RunId,
    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,
    /// Wall time spent running so far, excluding time spent paused.
    pub duration_ms: u64,
    /// Turn that paused.
    pub turn: u32,
    pub max_turns: u32,
    pub model: String,
    pub options: RequestOptions,
    pub messages: Vec<Message>,
    /// Tool schemas offered to the model.
    pub tools: Vec<ToolDefinition>,
    pub tools_enabled: bool,
    pub empty_final_fixup_attempted: bool,
    pub any_tool_calls_seen: bool,
    pub usage: Usage,
    pub turn_usage: Vec<Usage>,
    pub turn_traces: Vec<TurnTrace>,
    pub pause_reason: PauseReason,
    #[serde(default)]
    pub pending_tool_calls: Vec<PendingToolConfirmation>,
    /// Policy decision per pending call, keyed by tool call id.
    #[serde(default)]
    pub pending_decisions: BTreeMap<String, Decision>,
    #[serde(default)]
    pub pending_tool_executions: Vec<PendingToolExecution>,
    /// Results already known for the paused turn (denials, partial resumes).
    #[serde(default)]
    pub buffered_tool_results: BTreeMap<String, ToolResult>,
    pub tool_call_order: Vec<ToolCallRef>,
    pub max_tool_output_bytes: usize,
    pub max_tool_calls_per_turn: usize,
    pub empty_final_fixup: EmptyFinalFixup,
    #[serde(default)]
    pub context_attributes: BTreeMap<String, serde_json::Value>,
}

impl Continuation {
    /// Calls waiting for a confirmation decision.
    pub fn pending_tool_confirmations(&self) -> &[PendingToolConfirmation] {
        &self.pending_tool_calls
    }

    /// Ids still waiting on input, in call order.
    pub fn pending_tool_call_ids(&self) -> Vec<&str> {
        match self.pause_reason {
            PauseReason::AwaitingToolConfirmation => self
                .pending_tool_calls
                .iter()
                .map(|pending| pending.tool_call_id.as_str())
                .collect(),
            PauseReason::AwaitingToolResults => self
                .pending_tool_executions
                .iter()
                .map(|pending| pending.tool_call_id.as_str())
                .collect(),
        }
    }

    /// Reattach application attributes (tools and policies see them on resume).
    pub fn with_context_attributes(
        mut self,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        self.context_attributes = attributes;
        self
    }

    /// Check the structural invariants a resumable continuation must hold.
    pub fn validate(&self) -> Result<(), CodecError> {
        let invalid = |message: String| Err(CodecError::InvalidContinuation(message));

        match self.pause_reason {
            PauseReason::AwaitingToolConfirmation => {
                if self.pending_tool_calls.is_empty() {
                    return invalid("awaiting_tool_confirmation with no pending_tool_calls".into());
                }
                if !self.pending_tool_executions.is_empty() {
                    return invalid(
                        "awaiting_tool_confirmation must not carry pending_tool_executions".into(),
                    );
                }
                for pending in &self.pending_tool_calls {
                    if !self.pending_decisions.contains_key(&pending.tool_call_id) {
                        return invalid(format!(
                            "no pending decision for tool call '{}'",
                            pending.tool_call_id
                        ));
                    }
                }
                if self.pending_decisions.len() != self.pending_tool_calls.len() {
                    return invalid("pending_decisions do not match pending_tool_calls".into());
                }
            }
            PauseReason::AwaitingToolResults => {
                if self.pending_tool_executions.is_empty() {
                    return invalid("awaiting_tool_results with no pending_tool_executions".into());
                }
                if !self.pending_tool_calls.is_empty() || !self.pending_decisions.is_empty() {
                    return invalid(
                        "awaiting_tool_results must not carry pending confirmations".into(),
                    );
                }
            }
        }

        let ordered: BTreeSet<&str> = self
            .tool_call_order
            .iter()
            .map(|call| call.tool_call_id.as_str())
            .collect();
        if ordered.len() != self.tool_call_order.len() {
            return invalid("tool_call_order contains duplicate ids".into());
        }
        for id in self.pending_tool_call_ids() {
            if !ordered.contains(id) {
                return invalid(format!("pending tool call '{id}' missing from tool_call_order"));
            }
            if self.buffered_tool_results.contains_key(id) {
                return invalid(format!("pending tool call '{id}' already has a buffered result"));
            }
        }
        for id in self.buffered_tool_results.keys() {
            if !ordered.contains(id.as_str()) {
                return invalid(format!("buffered result '{id}' missing from tool_call_order"));
            }
        }
        if self.max_turns == 0 || self.turn == 0 || self.turn > self.max_turns {
            return invalid(format!(
                "turn {} is outside 1..={}",
                self.turn, self.max_turns
            ));
        }
        Ok(())
    }
}
