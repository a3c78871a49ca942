//! Run event stream types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::approvals::DecisionOutcome;
use super::trace::IgnoredToolCall;
use super::types::{PauseReason, RunId};
use crate::types::{StopReason, Usage};

/// Concrete event payloads emitted by the runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventPayload {
    RunStarted {
        model: String,
        resumed: bool,
    },
    TurnStarted {
        turn: u32,
    },
    TextDelta {
        turn: u32,
        text: String,
    },
    LlmResponse {
        turn: u32,
        stop_reason: StopReason,
        tool_calls: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    ToolCallsIgnored {
        turn: u32,
        calls: Vec<IgnoredToolCall>,
    },
    ToolAuthorized {
        turn: u32,
        tool_call_id: String,
        name: String,
        outcome: DecisionOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ToolExecuted {
        turn: u32,
        tool_call_id: String,
        name: String,
        succeeded: bool,
        duration_ms: u64,
        result_summary: String,
    },
    ToolDeferred {
        turn: u32,
        tool_call_id: String,
        name: String,
    },
    RunPaused {
        turn: u32,
        pause_reason: PauseReason,
        pending: usize,
    },
    RunCompleted {
        turns: u32,
        stop_reason: StopReason,
    },
}

/// Envelope for run events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    pub run_id: RunId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: RunEventPayload,
}

/// Callback receiving run events.
pub type RunEventSink = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// An observer (event sink or instrumenter) that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverError {
    pub run_id: RunId,
    pub observer: String,
    pub message: String,
}

/// Receives observer failures for a run. Its own failures are only logged.
pub type ObserverErrorSink = Arc<dyn Fn(ObserverError) + Send + Sync>;
