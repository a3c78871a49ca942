//! Stop reasons and streaming events.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::Message;
use super::usage::Usage;

/// Why a turn (or the whole run) stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// The model finished its answer.
    EndTurn,
    /// The model stopped to call tools.
    ToolUse,
    /// The model hit its output token limit.
    MaxTokens,
    StopSequence,
    ContentFilter,
    /// The run hit its turn budget.
    MaxTurns,
    Error,
}

/// An event produced by a streaming provider call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// The fully assembled assistant message.
    MessageComplete { message: Message },
    /// End of stream.
    Done {
        stop_reason: StopReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}
