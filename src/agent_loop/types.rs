//! Core run types for the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::continuation::Continuation;
use super::trace::TurnTrace;
use crate::types::timestamp;
use crate::types::{Message, StopReason, Usage};

/// Unique run identifier.
pub type RunId = Uuid;

/// Why a run stopped without finishing.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PauseReason {
    /// A policy asked for confirmation of at least one call.
    AwaitingToolConfirmation,
    /// The executor handed the calls to an external system.
    AwaitingToolResults,
}

/// Audit record for a whole run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunTrace {
    pub run_id: RunId,
    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub turns: u32,
    pub stop_reason: StopReason,
    pub usage: Usage,
    pub turn_traces: Vec<TurnTrace>,
}

/// A finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub run_id: RunId,
    /// Last assistant message of the transcript.
    pub final_message: Message,
    pub messages: Vec<Message>,
    pub stop_reason: StopReason,
    /// LLM calls made across the run, including resumed segments.
    pub turns: u32,
    pub usage: Usage,
    pub trace: RunTrace,
}

/// Outcome of `run` and the `resume` family.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunResult),
    Paused(Box<Continuation>),
}

impl RunOutcome {
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused(_))
    }

    pub fn completed(self) -> Option<RunResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Paused(_) => None,
        }
    }

    pub fn paused(self) -> Option<Continuation> {
        match self {
            Self::Paused(continuation) => Some(*continuation),
            Self::Completed(_) => None,
        }
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        match self {
            Self::Paused(continuation) => Some(continuation.pause_reason),
            Self::Completed(_) => None,
        }
    }
}
