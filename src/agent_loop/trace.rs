//! Audit records kept per turn.
//!
//! Traces are append-only. The only later write is a resume adding
//! confirmation and execution records to the turn that paused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::approvals::DecisionOutcome;
use crate::types::timestamp;
use crate::types::{StopReason, Usage};

/// Everything that happened in one LLM turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnTrace {
    pub turn: u32,
    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: u64,
    pub stop_reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub tools_offered: bool,
    /// This turn was the empty-final-answer retry.
    #[serde(default)]
    pub fixup: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_tool_calls: Vec<IgnoredToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorizations: Vec<AuthorizationTrace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmations: Vec<ConfirmationTrace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executions: Vec<ExecutionTrace>,
}

impl TurnTrace {
    pub fn new(turn: u32, started_at: DateTime<Utc>, stop_reason: StopReason) -> Self {
        Self {
            turn,
            started_at,
            duration_ms: 0,
            stop_reason,
            usage: None,
            tools_offered: false,
            fixup: false,
            ignored_tool_calls: Vec::new(),
            authorizations: Vec::new(),
            confirmations: Vec::new(),
            executions: Vec::new(),
        }
    }
}

/// Why a tool call was dropped without execution.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IgnoreReason {
    /// Past the per-turn call limit.
    OverTurnLimit,
    /// Emitted on a turn where no tools were offered.
    ToolsNotOffered,
    /// Reuses the id of an earlier call in the same turn.
    DuplicateId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IgnoredToolCall {
    pub tool_call_id: String,
    pub name: String,
    pub reason: IgnoreReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationTrace {
    pub tool_call_id: String,
    pub name: String,
    pub outcome: DecisionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub arguments_summary: String,
}

/// A human decision applied on resume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmationTrace {
    pub tool_call_id: String,
    pub name: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    /// Handed to an external executor.
    Deferred,
    /// Result supplied by an external executor on resume.
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionTrace {
    pub tool_call_id: String,
    pub name: String,
    pub executed_name: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
}
